//! Presentation-facing state: what a screen shows and the operations that change it.
//!
//! Each screen's state lives in a `watch` channel, so any number of readers
//! can follow it. Load failures end up in the `error` fields; only search
//! cancellation and favorite toggles report back through `Result`.

use std::{
    collections::HashSet,
    sync::{Arc, Weak},
    time::Duration,
};

use futures::StreamExt;
use serde::Serialize;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, warn};

use crate::{
    error::{StoreError, SyncError, SyncResult},
    filter::{filter_and_sort, sort_movies},
    models::{ActorDetail, FilterState, Genre, Movie, MovieDetails, SortBy},
    search::SearchSupervisor,
    sync::Synchronizer,
};

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MoviesState {
    pub movies: Vec<Movie>,
    pub genres: Vec<Genre>,
    pub filter_state: FilterState,
    pub is_loading: bool,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SearchState {
    pub query: String,
    pub results: Vec<Movie>,
    pub all_movies: Vec<Movie>,
    pub is_loading: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DetailState {
    pub movie_details: Option<MovieDetails>,
    pub is_loading: bool,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ActorState {
    pub actor: Option<ActorDetail>,
    pub movies: Vec<Movie>,
    pub is_loading: bool,
    pub error: Option<String>,
}

pub struct CatalogSession {
    sync: Synchronizer,
    search: SearchSupervisor,
    movies: watch::Sender<MoviesState>,
    search_state: watch::Sender<SearchState>,
    detail: watch::Sender<DetailState>,
    actor: watch::Sender<ActorState>,
    favorites: watch::Sender<Vec<Movie>>,
}

impl CatalogSession {
    pub fn new(sync: Synchronizer, search_debounce: Duration) -> Self {
        Self {
            sync,
            search: SearchSupervisor::new(search_debounce),
            movies: watch::Sender::new(MoviesState::default()),
            search_state: watch::Sender::new(SearchState::default()),
            detail: watch::Sender::new(DetailState::default()),
            actor: watch::Sender::new(ActorState::default()),
            favorites: watch::Sender::new(Vec::new()),
        }
    }

    pub fn sync(&self) -> &Synchronizer {
        &self.sync
    }

    pub fn movies_state(&self) -> MoviesState {
        self.movies.borrow().clone()
    }

    pub fn search_state(&self) -> SearchState {
        self.search_state.borrow().clone()
    }

    pub fn detail_state(&self) -> DetailState {
        self.detail.borrow().clone()
    }

    pub fn actor_state(&self) -> ActorState {
        self.actor.borrow().clone()
    }

    pub fn favorites(&self) -> Vec<Movie> {
        self.favorites.borrow().clone()
    }

    pub fn subscribe_movies(&self) -> watch::Receiver<MoviesState> {
        self.movies.subscribe()
    }

    pub fn subscribe_favorites(&self) -> watch::Receiver<Vec<Movie>> {
        self.favorites.subscribe()
    }

    /// Follows the movie stream to completion: cache snapshot first, then
    /// the fresh list when there is one.
    pub async fn load_movies(&self) -> MoviesState {
        self.movies.send_modify(|s| {
            s.is_loading = true;
            s.error = None;
        });

        let mut stream = self.sync.movies();
        while let Some(next) = stream.next().await {
            match next {
                Ok(movies) => self.movies.send_modify(|s| {
                    s.movies = apply_filter_state(movies, &s.filter_state);
                }),
                Err(err) => {
                    warn!(error = %err, "failed to load movies");
                    self.movies.send_modify(|s| s.error = Some(err.to_string()));
                    break;
                },
            }
        }

        self.movies.send_modify(|s| s.is_loading = false);
        self.movies_state()
    }

    pub async fn refresh_movies(&self) -> MoviesState {
        self.movies.send_modify(|s| {
            s.is_loading = true;
            s.error = None;
        });

        let result = self.sync.refresh_movies().await;
        self.movies.send_modify(|s| {
            match result {
                Ok(movies) => s.movies = apply_filter_state(movies, &s.filter_state),
                Err(err) => {
                    warn!(error = %err, "failed to refresh movies");
                    s.error = Some(err.to_string());
                },
            }
            s.is_loading = false;
        });
        self.movies_state()
    }

    pub async fn load_genres(&self) -> Vec<Genre> {
        let mut stream = self.sync.genres();
        while let Some(next) = stream.next().await {
            match next {
                Ok(genres) => self.movies.send_modify(|s| s.genres = genres),
                Err(err) => {
                    warn!(error = %err, "failed to load genres");
                    self.movies.send_modify(|s| s.error = Some(err.to_string()));
                    break;
                },
            }
        }
        self.movies.borrow().genres.clone()
    }

    pub async fn apply_filters(&self, filter: FilterState) -> MoviesState {
        self.movies.send_modify(|s| {
            s.filter_state = filter.clone();
            s.is_loading = true;
            s.error = None;
        });

        let result = self.sync.movies_filtered(&filter).await;
        self.movies.send_modify(|s| {
            match result {
                Ok(movies) => s.movies = movies,
                Err(err) => s.error = Some(err.to_string()),
            }
            s.is_loading = false;
        });
        self.movies_state()
    }

    pub async fn clear_filters(&self) -> MoviesState {
        self.apply_filters(FilterState::default()).await
    }

    /// Search-as-you-type entry point.
    ///
    /// A blank query shows every known movie by rating without asking the
    /// remote. A superseded search returns [`SyncError::Cancelled`] and
    /// leaves the results of whichever search replaced it alone. A search
    /// abandoned through [`Self::cancel_search`] also returns `Cancelled`
    /// and puts the state back to the last settled query.
    pub async fn search(&self, query: &str) -> SyncResult<SearchState> {
        let mut previous_query = String::new();
        self.search_state.send_modify(|s| {
            previous_query = std::mem::replace(&mut s.query, query.to_string());
            s.is_loading = true;
        });

        if query.trim().is_empty() {
            self.search.cancel();

            let all_movies = match self.sync.store().all_movies().await {
                Ok(movies) => movies,
                Err(err) => {
                    self.search_state.send_modify(|s| s.is_loading = false);
                    return Err(err.into());
                },
            };
            let mut results = all_movies.clone();
            sort_movies(&mut results, SortBy::RatingDesc);

            self.search_state.send_modify(|s| {
                s.all_movies = all_movies;
                s.results = results;
                s.is_loading = false;
            });
            return Ok(self.search_state());
        }

        match self.search.search(&self.sync, query).await {
            Ok(results) => {
                self.search_state.send_modify(|s| {
                    s.results = results;
                    s.is_loading = false;
                });
                Ok(self.search_state())
            },
            Err(SyncError::Cancelled) => {
                if self.search.is_idle() {
                    debug!(query = %query, "search cancelled");
                    self.search_state.send_modify(|s| {
                        if s.query == query {
                            s.query = previous_query;
                        }
                        s.is_loading = false;
                    });
                } else {
                    debug!(query = %query, "discarding superseded search");
                }
                Err(SyncError::Cancelled)
            },
            Err(err) => {
                warn!(query = %query, error = %err, "search failed");
                self.search_state.send_modify(|s| {
                    s.results.clear();
                    s.is_loading = false;
                });
                Err(err)
            },
        }
    }

    /// Abandons the in-flight search, if any. Its caller sees `Cancelled`.
    pub fn cancel_search(&self) {
        self.search.cancel();
    }

    pub async fn load_movie_details(&self, id: i32) -> DetailState {
        self.detail.send_modify(|s| {
            s.is_loading = true;
            s.error = None;
        });

        let result = self.sync.movie_details(id).await;
        self.detail.send_modify(|s| {
            match result {
                Ok(Some(details)) => s.movie_details = Some(details),
                Ok(None) => {
                    s.movie_details = None;
                    s.error = Some(format!("movie {id} not found"));
                },
                Err(err) => s.error = Some(err.to_string()),
            }
            s.is_loading = false;
        });
        self.detail_state()
    }

    pub async fn load_actor(&self, id: i32) -> ActorState {
        self.actor.send_modify(|s| {
            s.is_loading = true;
            s.error = None;
        });

        let (actor, movies) = tokio::join!(self.sync.actor_details(id), self.sync.actor_movies(id));
        self.actor.send_modify(|s| {
            match (actor, movies) {
                (Ok(Some(actor)), Ok(movies)) => {
                    s.actor = Some(actor);
                    s.movies = movies;
                },
                (Ok(None), _) => {
                    s.actor = None;
                    s.movies.clear();
                    s.error = Some(format!("actor {id} not found"));
                },
                (Err(err), _) | (_, Err(err)) => s.error = Some(err.to_string()),
            }
            s.is_loading = false;
        });
        self.actor_state()
    }

    /// Flips the favorite flag and re-stamps every held state right away;
    /// the favorites observer catches up on its own.
    pub async fn toggle_favorite(&self, movie: &Movie) -> SyncResult<Movie> {
        let updated = self.sync.toggle_favorite(movie).await?;
        let favorite_ids = self.sync.store().favorite_ids().await?;
        self.restamp(&favorite_ids);
        Ok(updated)
    }

    /// Looks the movie up in the store first, then in whatever the session
    /// currently shows.
    pub async fn toggle_favorite_by_id(&self, id: i32) -> SyncResult<Movie> {
        let movie = match self.sync.store().movie_by_id(id).await? {
            Some(movie) => movie,
            None => self.held_movie(id).ok_or(StoreError::NotFound(id))?,
        };
        self.toggle_favorite(&movie).await
    }

    fn held_movie(&self, id: i32) -> Option<Movie> {
        let find = |movies: &[Movie]| movies.iter().find(|m| m.id == id).cloned();

        find(&self.movies.borrow().movies)
            .or_else(|| find(&self.search_state.borrow().results))
            .or_else(|| {
                self.detail
                    .borrow()
                    .movie_details
                    .as_ref()
                    .filter(|d| d.movie.id == id)
                    .map(|d| d.movie.clone())
            })
            .or_else(|| find(&self.actor.borrow().movies))
    }

    /// Keeps `favorites` and every held `is_favorite` flag in step with the
    /// store. The task ends once the session is dropped.
    pub fn spawn_favorites_observer(self: &Arc<Self>) -> JoinHandle<()> {
        let session: Weak<Self> = Arc::downgrade(self);
        let mut stream = self.sync.favorite_movies();

        tokio::spawn(async move {
            while let Some(next) = stream.next().await {
                let Some(session) = session.upgrade() else { break };
                match next {
                    Ok(favorites) => session.observe_favorites(favorites),
                    Err(err) => warn!(error = %err, "favorites observer failed to read store"),
                }
            }
            debug!("favorites observer stopped");
        })
    }

    fn observe_favorites(&self, favorites: Vec<Movie>) {
        let favorite_ids: HashSet<i32> = favorites.iter().map(|m| m.id).collect();
        debug!(count = favorite_ids.len(), "favorites changed");
        self.favorites.send_replace(favorites);
        self.restamp(&favorite_ids);
    }

    fn restamp(&self, favorite_ids: &HashSet<i32>) {
        self.movies.send_if_modified(|s| stamp(&mut s.movies, favorite_ids));
        self.search_state.send_if_modified(|s| {
            let results = stamp(&mut s.results, favorite_ids);
            let all = stamp(&mut s.all_movies, favorite_ids);
            results || all
        });
        self.detail.send_if_modified(|s| match s.movie_details.as_mut() {
            Some(details) => stamp(std::slice::from_mut(&mut details.movie), favorite_ids),
            None => false,
        });
        self.actor.send_if_modified(|s| stamp(&mut s.movies, favorite_ids));
    }
}

fn apply_filter_state(movies: Vec<Movie>, filter: &FilterState) -> Vec<Movie> {
    if filter.has_active_filters() { filter_and_sort(movies, filter) } else { movies }
}

/// Returns whether any flag changed.
fn stamp(movies: &mut [Movie], favorite_ids: &HashSet<i32>) -> bool {
    let mut changed = false;
    for movie in movies {
        let is_favorite = favorite_ids.contains(&movie.id);
        if movie.is_favorite != is_favorite {
            movie.is_favorite = is_favorite;
            changed = true;
        }
    }
    changed
}
