//! Cache-versus-remote routing for every catalog read.
//!
//! The store is always consulted first. Remote data replaces cached data
//! except for `is_favorite`, which is local-only and carried forward.

use std::{collections::HashSet, sync::Arc};

use async_stream::try_stream;
use futures::stream::{BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    connectivity::Connectivity,
    error::{SyncError, SyncResult},
    filter::filter_and_sort,
    models::{ActorDetail, FilterState, Genre, Movie, MovieDetails, RemoteFilter},
    remote::RemoteSource,
    store::{CatalogStore, StoreWrite},
};

/// Remote result sets are cut to this many entries before they are cached.
pub const MAX_CACHED_MOVIES: usize = 100;

/// Outcome of merging a fresh remote batch into the cached list.
#[derive(Debug, PartialEq)]
pub struct Merge {
    /// Truncated fresh batch, favorite flags stamped. This is what gets emitted.
    pub fresh: Vec<Movie>,
    /// Cached favorites absent from `fresh`; persisted but not emitted.
    pub carried: Vec<Movie>,
}

impl Merge {
    pub fn persisted(&self) -> Vec<Movie> {
        self.fresh.iter().chain(&self.carried).cloned().collect()
    }
}

/// Favorite-preserving merge of `fresh` over the `cached` snapshot.
pub fn merge_fresh(cached: &[Movie], fresh: Vec<Movie>) -> Merge {
    let favorite_ids = favorite_ids(cached);

    let fresh: Vec<Movie> = fresh
        .into_iter()
        .take(MAX_CACHED_MOVIES)
        .map(|m| {
            let is_favorite = favorite_ids.contains(&m.id);
            m.with_favorite(is_favorite)
        })
        .collect();

    let fresh_ids: HashSet<i32> = fresh.iter().map(|m| m.id).collect();
    let carried =
        cached.iter().filter(|m| m.is_favorite && !fresh_ids.contains(&m.id)).cloned().collect();

    Merge { fresh, carried }
}

fn favorite_ids(movies: &[Movie]) -> HashSet<i32> {
    movies.iter().filter(|m| m.is_favorite).map(|m| m.id).collect()
}

fn stamp_favorites(movies: Vec<Movie>, favorite_ids: &HashSet<i32>) -> Vec<Movie> {
    movies
        .into_iter()
        .map(|m| {
            let is_favorite = favorite_ids.contains(&m.id);
            m.with_favorite(is_favorite)
        })
        .collect()
}

#[derive(Clone)]
pub struct Synchronizer {
    store: CatalogStore,
    remote: Arc<dyn RemoteSource>,
    connectivity: Arc<dyn Connectivity>,
}

impl Synchronizer {
    pub fn new(
        store: CatalogStore,
        remote: Arc<dyn RemoteSource>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        Self { store, remote, connectivity }
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    fn online(&self) -> bool {
        self.connectivity.is_available()
    }

    /// Cached snapshot first (when there is one), then the fresh remote list.
    ///
    /// Offline: exactly one emission, the cache, even when empty.
    /// Remote failure: nothing beyond the cache, or one empty list when the
    /// cache was empty too.
    pub fn movies(&self) -> BoxStream<'static, SyncResult<Vec<Movie>>> {
        let this = self.clone();

        try_stream! {
            let cached = this.store.all_movies().await?;

            if this.online() {
                if !cached.is_empty() {
                    yield cached.clone();
                }

                match this.remote.popular_movies().await {
                    Ok(fresh) => {
                        yield this.store_fresh(&cached, fresh).await;
                    },
                    Err(err) => {
                        warn!(error = %err, cached = cached.len(), "failed to fetch popular movies");
                        if cached.is_empty() {
                            yield Vec::new();
                        }
                    },
                }
            } else {
                debug!(cached = cached.len(), "offline, serving cached movies");
                yield cached;
            }
        }
        .boxed()
    }

    /// Pull-to-refresh: always exactly one result. Falls back to the
    /// unmodified cache when offline or when the remote call fails.
    pub async fn refresh_movies(&self) -> SyncResult<Vec<Movie>> {
        if !self.online() {
            debug!("offline, refresh served from cache");
            return Ok(self.store.all_movies().await?);
        }

        let cached = self.store.all_movies().await?;
        match self.remote.popular_movies().await {
            Ok(fresh) => Ok(self.store_fresh(&cached, fresh).await),
            Err(err) => {
                warn!(error = %err, "refresh failed, serving cache");
                Ok(cached)
            },
        }
    }

    /// Merges and persists a fresh batch, returning it as stored. When the
    /// write fails the merged batch is still returned; it just is not cached.
    async fn store_fresh(&self, cached: &[Movie], fresh: Vec<Movie>) -> Vec<Movie> {
        let received = fresh.len();
        let merge = merge_fresh(cached, fresh);
        debug!(
            received,
            kept = merge.fresh.len(),
            carried_favorites = merge.carried.len(),
            "merging popular movies"
        );

        match self.store.replace_movies(&merge.persisted()).await {
            Ok(mut persisted) => {
                persisted.truncate(merge.fresh.len());
                persisted
            },
            Err(err) => {
                warn!(error = %err, "failed to cache popular movies, serving them uncached");
                merge.fresh
            },
        }
    }

    /// Filters the cached list locally; the remote is never asked.
    pub async fn movies_filtered(&self, filter: &FilterState) -> SyncResult<Vec<Movie>> {
        let cached = self.store.all_movies().await?;
        let favorite_ids = favorite_ids(&cached);
        let filtered = filter_and_sort(cached, filter);
        debug!(matched = filtered.len(), active = filter.has_active_filters(), "filtered cache");
        Ok(stamp_favorites(filtered, &favorite_ids))
    }

    /// Remote search with local fallback.
    ///
    /// A blank query returns the whole cache without touching the remote.
    /// Cancellation through `cancel` surfaces as [`SyncError::Cancelled`],
    /// never as a fallback.
    pub async fn search_movies(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> SyncResult<Vec<Movie>> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        if query.trim().is_empty() {
            return Ok(self.store.all_movies().await?);
        }

        if !self.online() {
            debug!(query = %query, "offline, searching cache");
            return Ok(self.store.search_movies(query).await?);
        }

        match self.remote.search_movies(query, cancel).await {
            Ok(results) => {
                let favorite_ids = self.store.favorite_ids().await?;
                Ok(stamp_favorites(results, &favorite_ids))
            },
            Err(err) if err.is_cancelled() => {
                debug!(query = %query, "search cancelled");
                Err(SyncError::Cancelled)
            },
            Err(err) => {
                warn!(query = %query, error = %err, "remote search failed, searching cache");
                Ok(self.store.search_movies(query).await?)
            },
        }
    }

    /// Detail pages always try the remote first; the cached row is the fallback.
    /// `None` only when neither side knows the movie.
    ///
    /// The fetched movie is cached with the favorite flag stored at write
    /// time, so a toggle made while the fetch was in flight is kept.
    pub async fn movie_details(&self, id: i32) -> SyncResult<Option<MovieDetails>> {
        let (remote_movie, cast) = if self.online() {
            let (movie, cast) =
                tokio::join!(self.remote.movie_details(id), self.remote.movie_cast(id));
            let cast = cast.unwrap_or_else(|err| {
                warn!(movie_id = id, error = %err, "failed to fetch cast");
                Vec::new()
            });
            let movie = match movie {
                Ok(movie) => movie,
                Err(err) => {
                    warn!(movie_id = id, error = %err, "failed to fetch movie details");
                    None
                },
            };
            (movie, cast)
        } else {
            (None, Vec::new())
        };

        // The remote never owns the flag; a new row starts unfavorited.
        let movie = match remote_movie.map(|m| m.with_favorite(false)) {
            Some(movie) => match self.store.upsert_keeping_favorite(&movie).await {
                Ok(stored) => Some(stored),
                Err(err) => {
                    warn!(movie_id = id, error = %err, "failed to cache movie details");
                    let is_favorite = self.store.favorite_ids().await?.contains(&id);
                    Some(movie.with_favorite(is_favorite))
                },
            },
            None => self.store.movie_by_id(id).await?,
        };

        Ok(movie.map(|movie| MovieDetails { movie, cast }))
    }

    /// Flips `is_favorite`. Updates the stored row when there is one, inserts
    /// a favorite-only row otherwise. Returns the movie as written.
    pub async fn toggle_favorite(&self, movie: &Movie) -> SyncResult<Movie> {
        let updated = movie.clone().with_favorite(!movie.is_favorite);

        let write = if self.store.movie_by_id(movie.id).await?.is_some() {
            StoreWrite::UpdateExisting(updated.clone())
        } else {
            StoreWrite::Upsert(updated.clone())
        };
        self.store.apply(write).await?;

        debug!(movie_id = movie.id, is_favorite = updated.is_favorite, "toggled favorite");
        Ok(updated)
    }

    /// Cached genres first (when there are any), then the fresh remote list.
    pub fn genres(&self) -> BoxStream<'static, SyncResult<Vec<Genre>>> {
        let this = self.clone();

        try_stream! {
            let cached = this.store.all_genres().await?;
            if !cached.is_empty() {
                yield cached.clone();
            }

            if this.online() {
                match this.remote.genres().await {
                    Ok(fresh) => {
                        this.store.replace_genres(&fresh).await?;
                        yield this.store.all_genres().await?;
                    },
                    Err(err) => {
                        warn!(error = %err, "failed to fetch genres");
                        if cached.is_empty() {
                            yield Vec::new();
                        }
                    },
                }
            } else if cached.is_empty() {
                yield Vec::new();
            }
        }
        .boxed()
    }

    pub fn movies_by_genre(&self, genre_id: i32) -> BoxStream<'static, SyncResult<Vec<Movie>>> {
        self.store.watch_movies_by_genre(genre_id).map(|r| r.map_err(SyncError::from)).boxed()
    }

    pub fn favorite_movies(&self) -> BoxStream<'static, SyncResult<Vec<Movie>>> {
        self.store.watch_favorite_movies().map(|r| r.map_err(SyncError::from)).boxed()
    }

    /// Remote single-valued filtering; falls back to the local engine plus a
    /// text match when offline or on failure.
    pub async fn discover_movies(&self, filter: &RemoteFilter) -> SyncResult<Vec<Movie>> {
        if self.online() {
            match self.remote.movies_filtered(filter).await {
                Ok(results) => {
                    let favorite_ids = self.store.favorite_ids().await?;
                    return Ok(stamp_favorites(results, &favorite_ids));
                },
                Err(err) => warn!(error = %err, "remote discovery failed, filtering cache"),
            }
        }

        let needle = filter.text.as_deref().unwrap_or_default().to_lowercase();
        let cached = self.store.all_movies().await?;
        let matching = cached.into_iter().filter(|m| m.matches_text(&needle)).collect();
        Ok(filter_and_sort(matching, &filter.to_filter_state()))
    }

    pub async fn actor_details(&self, id: i32) -> SyncResult<Option<ActorDetail>> {
        if !self.online() {
            return Ok(None);
        }
        match self.remote.actor_details(id).await {
            Ok(actor) => Ok(actor),
            Err(err) => {
                warn!(actor_id = id, error = %err, "failed to fetch actor");
                Ok(None)
            },
        }
    }

    pub async fn actor_movies(&self, id: i32) -> SyncResult<Vec<Movie>> {
        if !self.online() {
            return Ok(Vec::new());
        }
        match self.remote.actor_movies(id).await {
            Ok(movies) => {
                let favorite_ids = self.store.favorite_ids().await?;
                Ok(stamp_favorites(movies, &favorite_ids))
            },
            Err(err) => {
                warn!(actor_id = id, error = %err, "failed to fetch actor movies");
                Ok(Vec::new())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie(id: i32, rating: f32, is_favorite: bool) -> Movie {
        Movie {
            id,
            title: format!("Movie {id}"),
            overview: String::new(),
            poster_url: None,
            backdrop_url: None,
            rating,
            release_date: "2020-01-01".to_string(),
            genre_ids: Vec::new(),
            vote_count: 0,
            is_favorite,
        }
    }

    #[test]
    fn favorites_missing_from_fresh_batch_are_carried() {
        let cached = vec![movie(1, 9.0, true), movie(3, 5.0, false)];
        let fresh = vec![movie(2, 7.0, false)];

        let merge = merge_fresh(&cached, fresh);

        assert_eq!(merge.fresh, vec![movie(2, 7.0, false)]);
        assert_eq!(merge.carried, vec![movie(1, 9.0, true)]);
        assert_eq!(merge.persisted().len(), 2);
    }

    #[test]
    fn fresh_entries_inherit_cached_favorite_flag() {
        let cached = vec![movie(1, 9.0, true), movie(2, 6.0, false)];
        let fresh = vec![movie(1, 8.5, false), movie(2, 6.5, true)];

        let merge = merge_fresh(&cached, fresh);

        assert_eq!(merge.fresh, vec![movie(1, 8.5, true), movie(2, 6.5, false)]);
        assert!(merge.carried.is_empty());
    }

    #[test]
    fn fresh_batch_is_truncated() {
        let cached = vec![movie(500, 9.0, true)];
        let fresh = (0..250).map(|id| movie(id, 5.0, false)).collect();

        let merge = merge_fresh(&cached, fresh);

        assert_eq!(merge.fresh.len(), MAX_CACHED_MOVIES);
        assert_eq!(merge.fresh.last().map(|m| m.id), Some(99));
        assert_eq!(merge.carried.len(), 1);
    }

    #[test]
    fn favorite_beyond_truncation_is_carried_not_dropped() {
        let cached = vec![movie(150, 9.0, true)];
        let fresh = (0..200).map(|id| movie(id, 5.0, false)).collect();

        let merge = merge_fresh(&cached, fresh);

        assert!(merge.fresh.iter().all(|m| m.id != 150));
        assert_eq!(merge.carried, vec![movie(150, 9.0, true)]);
    }
}
