mod common;

use std::{
    sync::{Arc, atomic::Ordering},
    time::Duration,
};

use common::{FakeRemote, Harness, favorite, ids, movie, rated};
use filmsync::{
    error::{StoreError, SyncError},
    models::{FilterState, Genre, SortBy},
    session::CatalogSession,
};

const DEBOUNCE: Duration = Duration::from_millis(40);

async fn session(remote: FakeRemote, online: bool) -> (Harness, Arc<CatalogSession>) {
    let h = Harness::new(remote, online).await;
    let session = Arc::new(CatalogSession::new(h.sync.clone(), DEBOUNCE));
    (h, session)
}

fn searchable() -> FakeRemote {
    let remote = FakeRemote::default();
    *remote.search_results.lock().unwrap() = vec![
        movie(1, "Inception", 8.4, "2010-07-16", &[28, 878]),
        movie(2, "Interstellar", 8.7, "2014-11-07", &[12, 878]),
    ];
    remote
}

#[tokio::test]
async fn load_movies_ends_with_the_fresh_list() {
    let (h, session) =
        session(FakeRemote::with_popular(vec![rated(2, 7.0), rated(3, 6.0)]), true).await;
    h.store.insert_movie(&rated(1, 9.0)).await.unwrap();

    let state = session.load_movies().await;

    assert_eq!(ids(&state.movies), vec![2, 3]);
    assert!(!state.is_loading);
    assert_eq!(state.error, None);
}

#[tokio::test]
async fn filters_apply_to_loaded_and_refreshed_movies() {
    let popular = vec![
        movie(1, "Heat", 8.3, "1995-12-15", &[80]),
        movie(2, "Alien", 8.5, "1979-05-25", &[878]),
        movie(3, "Casino", 8.2, "1995-11-22", &[80]),
    ];
    let (_h, session) = session(FakeRemote::with_popular(popular), true).await;
    session.load_movies().await;

    let filter =
        FilterState { genre_ids: [80].into(), sort_by: SortBy::TitleAsc, ..Default::default() };
    let state = session.apply_filters(filter.clone()).await;
    assert_eq!(ids(&state.movies), vec![3, 1]);
    assert_eq!(state.filter_state, filter);

    let state = session.refresh_movies().await;
    assert_eq!(ids(&state.movies), vec![3, 1]);

    let state = session.clear_filters().await;
    assert_eq!(ids(&state.movies), vec![2, 1, 3]);
    assert!(!state.filter_state.has_active_filters());
}

#[tokio::test]
async fn genres_land_in_the_movies_state() {
    let remote = FakeRemote::default();
    *remote.genres.lock().unwrap() = vec![Genre { id: 18, name: "Drama".into() }];
    let (_h, session) = session(remote, true).await;

    let genres = session.load_genres().await;

    assert_eq!(genres, vec![Genre { id: 18, name: "Drama".into() }]);
    assert_eq!(session.movies_state().genres, genres);
}

#[tokio::test]
async fn blank_query_lists_everything_by_rating() {
    let (h, session) = session(searchable(), true).await;
    h.store.insert_movies(&[rated(1, 5.0), rated(2, 9.0), rated(3, 7.0)]).await.unwrap();

    let state = session.search("  ").await.unwrap();

    assert_eq!(ids(&state.results), vec![2, 3, 1]);
    assert_eq!(ids(&state.all_movies), vec![2, 3, 1]);
    assert!(!state.is_loading);
    assert_eq!(FakeRemote::calls(&h.remote.search_calls), 0);
}

#[tokio::test]
async fn latest_search_wins() {
    let (h, session) = session(searchable(), true).await;

    let first = {
        let session = session.clone();
        tokio::spawn(async move { session.search("incep").await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = session.search("inter").await.unwrap();

    let first = first.await.unwrap();
    assert!(matches!(first, Err(SyncError::Cancelled)), "{first:?}");
    assert_eq!(ids(&second.results), vec![2]);
    assert_eq!(session.search_state().query, "inter");
    assert_eq!(ids(&session.search_state().results), vec![2]);
    // The superseded search never got past its quiet period.
    assert_eq!(FakeRemote::calls(&h.remote.search_calls), 1);
}

#[tokio::test]
async fn cancelled_search_keeps_previous_results() {
    let (h, session) = session(searchable(), true).await;
    let before = session.search("incep").await.unwrap();
    assert_eq!(ids(&before.results), vec![1]);

    h.remote.search_hangs.store(true, Ordering::SeqCst);
    let pending = {
        let session = session.clone();
        tokio::spawn(async move { session.search("inter").await })
    };
    tokio::time::sleep(DEBOUNCE * 3).await;
    session.cancel_search();

    let result = tokio::time::timeout(Duration::from_secs(2), pending).await.unwrap().unwrap();
    assert!(matches!(result, Err(SyncError::Cancelled)), "{result:?}");
    let state = session.search_state();
    assert_eq!(state.results, before.results);
    assert_eq!(state.query, "incep");
    assert!(!state.is_loading);
}

#[tokio::test]
async fn details_and_missing_movies() {
    let (h, session) = session(FakeRemote::default(), true).await;
    h.remote.details.lock().unwrap().insert(1, rated(1, 6.5));

    let state = session.load_movie_details(1).await;
    assert_eq!(state.movie_details.map(|d| d.movie), Some(rated(1, 6.5)));
    assert_eq!(state.error, None);

    let state = session.load_movie_details(99).await;
    assert!(state.movie_details.is_none());
    assert!(state.error.is_some());
    assert!(!state.is_loading);
}

#[tokio::test]
async fn unknown_actor_sets_an_error() {
    let (_h, session) = session(FakeRemote::default(), true).await;

    let state = session.load_actor(5).await;

    assert!(state.actor.is_none());
    assert!(state.movies.is_empty());
    assert!(state.error.is_some());
}

#[tokio::test]
async fn toggling_restamps_every_held_state() {
    let (h, session) = session(FakeRemote::with_popular(vec![rated(1, 7.0), rated(2, 6.0)]), true).await;
    session.load_movies().await;
    h.remote.details.lock().unwrap().insert(1, rated(1, 7.0));
    session.load_movie_details(1).await;

    let toggled = session.toggle_favorite_by_id(1).await.unwrap();

    assert!(toggled.is_favorite);
    assert!(session.movies_state().movies[0].is_favorite);
    assert!(!session.movies_state().movies[1].is_favorite);
    assert!(session.detail_state().movie_details.unwrap().movie.is_favorite);
}

#[tokio::test]
async fn toggling_an_unknown_id_is_not_found() {
    let (_h, session) = session(FakeRemote::default(), false).await;

    let err = session.toggle_favorite_by_id(77).await.unwrap_err();

    assert!(matches!(err, SyncError::Store(StoreError::NotFound(77))), "{err:?}");
}

#[tokio::test]
async fn observer_tracks_favorites_changed_elsewhere() {
    let (h, session) = session(FakeRemote::default(), false).await;
    h.store.insert_movies(&[rated(1, 7.0), rated(2, 6.0)]).await.unwrap();
    session.load_movies().await;

    let observer = session.spawn_favorites_observer();
    let mut movies = session.subscribe_movies();

    // Toggle through the synchronizer directly so only the observer can
    // update the session.
    h.sync.toggle_favorite(&rated(2, 6.0)).await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if movies.borrow_and_update().movies.iter().any(|m| m.id == 2 && m.is_favorite) {
                break;
            }
            movies.changed().await.unwrap();
        }
    })
    .await
    .unwrap();
    assert_eq!(session.favorites(), vec![favorite(rated(2, 6.0))]);

    observer.abort();
}
