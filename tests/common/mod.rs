#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use filmsync::{
    connectivity::ManualSwitch,
    db,
    error::{RemoteError, RemoteResult},
    models::{ActorDetail, CastMember, Genre, Movie, RemoteFilter},
    remote::RemoteSource,
    store::CatalogStore,
    sync::Synchronizer,
};
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

pub async fn memory_store() -> CatalogStore {
    let db = db::connect_and_migrate("sqlite::memory:").await.unwrap();
    CatalogStore::new(db)
}

pub fn movie(id: i32, title: &str, rating: f32, release_date: &str, genre_ids: &[i32]) -> Movie {
    Movie {
        id,
        title: title.to_string(),
        overview: format!("Overview of {title}"),
        poster_url: Some(format!("https://media.test/posters/{id}.jpg")),
        backdrop_url: None,
        rating,
        release_date: release_date.to_string(),
        genre_ids: genre_ids.to_vec(),
        vote_count: 100,
        is_favorite: false,
    }
}

pub fn rated(id: i32, rating: f32) -> Movie {
    movie(id, &format!("Movie {id}"), rating, "2020-01-01", &[])
}

pub fn favorite(mut movie: Movie) -> Movie {
    movie.is_favorite = true;
    movie
}

pub fn ids(movies: &[Movie]) -> Vec<i32> {
    movies.iter().map(|m| m.id).collect()
}

/// Drains a finite stream, panicking if it takes longer than a few seconds.
pub async fn collect_all<T>(stream: impl Stream<Item = T>) -> Vec<T> {
    tokio::time::timeout(Duration::from_secs(5), stream.collect::<Vec<_>>())
        .await
        .expect("stream did not finish")
}

/// Scripted remote catalog with call counters and failure switches.
#[derive(Default)]
pub struct FakeRemote {
    pub popular: Mutex<Vec<Movie>>,
    pub details: Mutex<HashMap<i32, Movie>>,
    pub cast: Mutex<Vec<CastMember>>,
    pub search_results: Mutex<Vec<Movie>>,
    pub genres: Mutex<Vec<Genre>>,
    pub filtered: Mutex<Vec<Movie>>,
    pub actor: Mutex<Option<ActorDetail>>,
    /// Favorites the requested movie in this store while the detail fetch
    /// is in flight.
    pub favorite_during_details: Mutex<Option<CatalogStore>>,

    /// Every call fails.
    pub failing: AtomicBool,
    pub cast_failing: AtomicBool,
    /// Search blocks until its token is cancelled.
    pub search_hangs: AtomicBool,

    pub popular_calls: AtomicUsize,
    pub detail_calls: AtomicUsize,
    pub search_calls: AtomicUsize,
    pub genre_calls: AtomicUsize,
    pub filtered_calls: AtomicUsize,
}

impl FakeRemote {
    pub fn with_popular(movies: Vec<Movie>) -> Self {
        let remote = Self::default();
        *remote.popular.lock().unwrap() = movies;
        remote
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn check(&self) -> RemoteResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("scripted failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteSource for FakeRemote {
    async fn popular_movies(&self) -> RemoteResult<Vec<Movie>> {
        self.popular_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.popular.lock().unwrap().clone())
    }

    async fn movie_details(&self, id: i32) -> RemoteResult<Option<Movie>> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let store = self.favorite_during_details.lock().unwrap().clone();
        if let Some(store) = store {
            let stored = store.movie_by_id(id).await.unwrap().expect("movie to favorite");
            store.update_movie(&stored.with_favorite(true)).await.unwrap();
        }
        Ok(self.details.lock().unwrap().get(&id).cloned())
    }

    async fn movie_cast(&self, _id: i32) -> RemoteResult<Vec<CastMember>> {
        self.check()?;
        if self.cast_failing.load(Ordering::SeqCst) {
            return Err(RemoteError::Status(500));
        }
        Ok(self.cast.lock().unwrap().clone())
    }

    async fn search_movies(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> RemoteResult<Vec<Movie>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if self.search_hangs.load(Ordering::SeqCst) {
            cancel.cancelled().await;
            return Err(RemoteError::Cancelled);
        }
        self.check()?;
        let needle = text.to_lowercase();
        let results = self.search_results.lock().unwrap().clone();
        Ok(results.into_iter().filter(|m| m.matches_text(&needle)).collect())
    }

    async fn genres(&self) -> RemoteResult<Vec<Genre>> {
        self.genre_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.genres.lock().unwrap().clone())
    }

    async fn movies_filtered(&self, _filter: &RemoteFilter) -> RemoteResult<Vec<Movie>> {
        self.filtered_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.filtered.lock().unwrap().clone())
    }

    async fn actor_details(&self, _id: i32) -> RemoteResult<Option<ActorDetail>> {
        self.check()?;
        Ok(self.actor.lock().unwrap().clone())
    }

    async fn actor_movies(&self, _id: i32) -> RemoteResult<Vec<Movie>> {
        self.check()?;
        Ok(self.filtered.lock().unwrap().clone())
    }
}

pub struct Harness {
    pub store: CatalogStore,
    pub remote: Arc<FakeRemote>,
    pub switch: Arc<ManualSwitch>,
    pub sync: Synchronizer,
}

impl Harness {
    pub async fn new(remote: FakeRemote, online: bool) -> Self {
        let store = memory_store().await;
        let remote = Arc::new(remote);
        let switch = Arc::new(ManualSwitch::new(online));
        let sync = Synchronizer::new(store.clone(), remote.clone(), switch.clone());
        Self { store, remote, switch, sync }
    }

    pub async fn online() -> Self {
        Self::new(FakeRemote::default(), true).await
    }

    pub async fn offline() -> Self {
        Self::new(FakeRemote::default(), false).await
    }
}
