//! Durable movie and genre records backed by SQLite.
//!
//! One-shot queries return the current rows; the `watch_*` variants return a
//! stream that yields the query result immediately and again after every
//! committed write to the same table.

use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::Arc,
};

use async_stream::stream;
use futures::{StreamExt, stream::BoxStream};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, TransactionTrait, sea_query::OnConflict,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::{
    changes::{ChangeBus, Table},
    entities::{genre, movie},
    error::{StoreError, StoreResult},
    models::{Genre, Movie},
};

/// Rows per multi-row insert; keeps the bound parameter count well below
/// SQLite's limit.
const INSERT_CHUNK: usize = 50;
const DELETE_CHUNK: usize = 500;

/// A movie write. `UpdateExisting` fails with [`StoreError::NotFound`] when
/// no row carries the movie's id, so callers must branch explicitly.
#[derive(Clone, Debug)]
pub enum StoreWrite {
    Upsert(Movie),
    UpdateExisting(Movie),
}

#[derive(Clone)]
pub struct CatalogStore {
    db: DatabaseConnection,
    changes: Arc<ChangeBus>,
}

impl CatalogStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db, changes: Arc::new(ChangeBus::default()) }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// All movies, rating descending.
    pub async fn all_movies(&self) -> StoreResult<Vec<Movie>> {
        let rows = movie::Entity::find()
            .order_by_desc(movie::Column::Rating)
            .order_by_asc(movie::Column::Id)
            .all(&self.db)
            .await?;
        rows.into_iter().map(to_movie).collect()
    }

    pub async fn movie_by_id(&self, id: i32) -> StoreResult<Option<Movie>> {
        let row = movie::Entity::find_by_id(id).one(&self.db).await?;
        row.map(to_movie).transpose()
    }

    /// Title or overview contains `query`, ignoring case. Rating descending.
    pub async fn search_movies(&self, query: &str) -> StoreResult<Vec<Movie>> {
        let needle = query.to_lowercase();
        let movies = self.all_movies().await?;
        Ok(movies.into_iter().filter(|m| m.matches_text(&needle)).collect())
    }

    pub async fn movies_by_genre(&self, genre_id: i32) -> StoreResult<Vec<Movie>> {
        let movies = self.all_movies().await?;
        Ok(movies.into_iter().filter(|m| m.has_genre(genre_id)).collect())
    }

    /// The favorite ledger, title ascending.
    pub async fn favorite_movies(&self) -> StoreResult<Vec<Movie>> {
        let rows = movie::Entity::find()
            .filter(movie::Column::IsFavorite.eq(true))
            .order_by_asc(movie::Column::Title)
            .order_by_asc(movie::Column::Id)
            .all(&self.db)
            .await?;
        rows.into_iter().map(to_movie).collect()
    }

    pub async fn favorite_ids(&self) -> StoreResult<HashSet<i32>> {
        let ids: Vec<i32> = movie::Entity::find()
            .select_only()
            .column(movie::Column::Id)
            .filter(movie::Column::IsFavorite.eq(true))
            .into_tuple::<i32>()
            .all(&self.db)
            .await?;
        Ok(ids.into_iter().collect())
    }

    /// Upsert by id. A conflicting row is overwritten in full.
    pub async fn insert_movies(&self, movies: &[Movie]) -> StoreResult<()> {
        if movies.is_empty() {
            return Ok(());
        }

        let txn = self.db.begin().await?;
        upsert_movies(&txn, movies, now_sec()).await?;
        txn.commit().await?;

        self.changes.publish(Table::Movies);
        Ok(())
    }

    pub async fn insert_movie(&self, movie: &Movie) -> StoreResult<()> {
        self.insert_movies(std::slice::from_ref(movie)).await
    }

    /// Upsert that keeps the stored `is_favorite` for the movie's id; a new
    /// row takes the flag from `movie`. Returns the movie as persisted.
    pub async fn upsert_keeping_favorite(&self, movie: &Movie) -> StoreResult<Movie> {
        let txn = self.db.begin().await?;

        let stored: Option<bool> = movie::Entity::find_by_id(movie.id)
            .select_only()
            .column(movie::Column::IsFavorite)
            .into_tuple::<bool>()
            .one(&txn)
            .await?;
        let movie = movie.clone().with_favorite(stored.unwrap_or(movie.is_favorite));

        upsert_movies(&txn, std::slice::from_ref(&movie), now_sec()).await?;
        txn.commit().await?;

        self.changes.publish(Table::Movies);
        Ok(movie)
    }

    pub async fn update_movie(&self, movie: &Movie) -> StoreResult<()> {
        let txn = self.db.begin().await?;

        if movie::Entity::find_by_id(movie.id).one(&txn).await?.is_none() {
            return Err(StoreError::NotFound(movie.id));
        }
        movie::Entity::update(active_movie(movie, now_sec())?).exec(&txn).await?;
        txn.commit().await?;

        self.changes.publish(Table::Movies);
        Ok(())
    }

    pub async fn apply(&self, write: StoreWrite) -> StoreResult<()> {
        match write {
            StoreWrite::Upsert(movie) => self.insert_movie(&movie).await,
            StoreWrite::UpdateExisting(movie) => self.update_movie(&movie).await,
        }
    }

    /// Makes `batch` the cached movie list.
    ///
    /// Inside one transaction: every batch entry whose id is already stored
    /// takes the stored `is_favorite`, non-favorite rows missing from the
    /// batch are evicted, and the batch is upserted. Favorite rows are never
    /// evicted. Returns the batch as persisted. An empty batch changes nothing.
    pub async fn replace_movies(&self, batch: &[Movie]) -> StoreResult<Vec<Movie>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let txn = self.db.begin().await?;

        let stored: HashMap<i32, bool> = movie::Entity::find()
            .select_only()
            .column(movie::Column::Id)
            .column(movie::Column::IsFavorite)
            .into_tuple::<(i32, bool)>()
            .all(&txn)
            .await?
            .into_iter()
            .collect();

        let persisted: Vec<Movie> = batch
            .iter()
            .map(|m| {
                let is_favorite = stored.get(&m.id).copied().unwrap_or(m.is_favorite);
                m.clone().with_favorite(is_favorite)
            })
            .collect();

        let keep: HashSet<i32> = batch.iter().map(|m| m.id).collect();
        let evict: Vec<i32> = stored
            .iter()
            .filter(|(id, is_favorite)| !**is_favorite && !keep.contains(*id))
            .map(|(id, _)| *id)
            .collect();

        for chunk in evict.chunks(DELETE_CHUNK) {
            movie::Entity::delete_many()
                .filter(movie::Column::Id.is_in(chunk.iter().copied()))
                .exec(&txn)
                .await?;
        }

        upsert_movies(&txn, &persisted, now_sec()).await?;
        txn.commit().await?;

        debug!(stored = persisted.len(), evicted = evict.len(), "replaced cached movies");
        self.changes.publish(Table::Movies);
        Ok(persisted)
    }

    pub async fn delete_all_movies(&self) -> StoreResult<()> {
        movie::Entity::delete_many().exec(&self.db).await?;
        self.changes.publish(Table::Movies);
        Ok(())
    }

    /// All genres, name ascending.
    pub async fn all_genres(&self) -> StoreResult<Vec<Genre>> {
        let rows = genre::Entity::find()
            .order_by_asc(genre::Column::Name)
            .order_by_asc(genre::Column::Id)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(to_genre).collect())
    }

    pub async fn genre_by_id(&self, id: i32) -> StoreResult<Option<Genre>> {
        let row = genre::Entity::find_by_id(id).one(&self.db).await?;
        Ok(row.map(to_genre))
    }

    pub async fn insert_genres(&self, genres: &[Genre]) -> StoreResult<()> {
        if genres.is_empty() {
            return Ok(());
        }

        let txn = self.db.begin().await?;
        upsert_genres(&txn, genres).await?;
        txn.commit().await?;

        self.changes.publish(Table::Genres);
        Ok(())
    }

    /// Swaps the whole genre table for `genres`.
    pub async fn replace_genres(&self, genres: &[Genre]) -> StoreResult<()> {
        let txn = self.db.begin().await?;
        genre::Entity::delete_many().exec(&txn).await?;
        upsert_genres(&txn, genres).await?;
        txn.commit().await?;

        self.changes.publish(Table::Genres);
        Ok(())
    }

    pub async fn delete_all_genres(&self) -> StoreResult<()> {
        genre::Entity::delete_many().exec(&self.db).await?;
        self.changes.publish(Table::Genres);
        Ok(())
    }

    pub fn watch_all_movies(&self) -> BoxStream<'static, StoreResult<Vec<Movie>>> {
        self.observe(Table::Movies, |store| async move { store.all_movies().await })
    }

    pub fn watch_search_movies(&self, query: String) -> BoxStream<'static, StoreResult<Vec<Movie>>> {
        self.observe(Table::Movies, move |store| {
            let query = query.clone();
            async move { store.search_movies(&query).await }
        })
    }

    pub fn watch_movies_by_genre(
        &self,
        genre_id: i32,
    ) -> BoxStream<'static, StoreResult<Vec<Movie>>> {
        self.observe(Table::Movies, move |store| async move {
            store.movies_by_genre(genre_id).await
        })
    }

    pub fn watch_favorite_movies(&self) -> BoxStream<'static, StoreResult<Vec<Movie>>> {
        self.observe(Table::Movies, |store| async move { store.favorite_movies().await })
    }

    pub fn watch_all_genres(&self) -> BoxStream<'static, StoreResult<Vec<Genre>>> {
        self.observe(Table::Genres, |store| async move { store.all_genres().await })
    }

    fn observe<T, F, Fut>(&self, table: Table, query: F) -> BoxStream<'static, StoreResult<T>>
    where
        T: Send + 'static,
        F: Fn(CatalogStore) -> Fut + Send + 'static,
        Fut: Future<Output = StoreResult<T>> + Send,
    {
        let store = self.clone();
        // Subscribe before the first read so no write can slip in between.
        let mut changes = self.changes.subscribe();

        stream! {
            yield query(store.clone()).await;
            loop {
                match changes.recv().await {
                    Ok(changed) if changed != table => {},
                    Ok(_) | Err(RecvError::Lagged(_)) => {
                        yield query(store.clone()).await;
                    },
                    Err(RecvError::Closed) => break,
                }
            }
        }
        .boxed()
    }
}

async fn upsert_movies<C: ConnectionTrait>(conn: &C, movies: &[Movie], now: i64) -> StoreResult<()> {
    for chunk in movies.chunks(INSERT_CHUNK) {
        let models = chunk.iter().map(|m| active_movie(m, now)).collect::<StoreResult<Vec<_>>>()?;
        movie::Entity::insert_many(models)
            .on_conflict(
                OnConflict::column(movie::Column::Id)
                    .update_columns([
                        movie::Column::Title,
                        movie::Column::Overview,
                        movie::Column::PosterPath,
                        movie::Column::BackdropPath,
                        movie::Column::Rating,
                        movie::Column::ReleaseDate,
                        movie::Column::GenreIds,
                        movie::Column::VoteCount,
                        movie::Column::IsFavorite,
                        movie::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;
    }
    Ok(())
}

async fn upsert_genres<C: ConnectionTrait>(conn: &C, genres: &[Genre]) -> StoreResult<()> {
    for chunk in genres.chunks(INSERT_CHUNK) {
        let models = chunk.iter().map(|g| genre::ActiveModel {
            id: Set(g.id),
            name: Set(g.name.clone()),
        });
        genre::Entity::insert_many(models)
            .on_conflict(
                OnConflict::column(genre::Column::Id)
                    .update_columns([genre::Column::Name])
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;
    }
    Ok(())
}

fn active_movie(movie: &Movie, now: i64) -> StoreResult<movie::ActiveModel> {
    Ok(movie::ActiveModel {
        id: Set(movie.id),
        title: Set(movie.title.clone()),
        overview: Set(movie.overview.clone()),
        poster_path: Set(movie.poster_url.clone()),
        backdrop_path: Set(movie.backdrop_url.clone()),
        rating: Set(movie.rating),
        release_date: Set(movie.release_date.clone()),
        genre_ids: Set(serde_json::to_string(&movie.genre_ids)?),
        vote_count: Set(movie.vote_count),
        is_favorite: Set(movie.is_favorite),
        updated_at: Set(now),
    })
}

fn to_movie(row: movie::Model) -> StoreResult<Movie> {
    Ok(Movie {
        id: row.id,
        title: row.title,
        overview: row.overview,
        poster_url: row.poster_path,
        backdrop_url: row.backdrop_path,
        rating: row.rating,
        release_date: row.release_date,
        genre_ids: serde_json::from_str(&row.genre_ids)?,
        vote_count: row.vote_count,
        is_favorite: row.is_favorite,
    })
}

fn to_genre(row: genre::Model) -> Genre {
    Genre { id: row.id, name: row.name }
}

fn now_sec() -> i64 {
    jiff::Timestamp::now().as_second()
}
