//! The remote catalog as seen by the synchronizer.
//!
//! Every call is fallible. Only [`RemoteError::Cancelled`] carries meaning
//! beyond "fall back to the cache".

mod demo;
mod http;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use self::{demo::DemoCatalog, http::CatalogClient};
use crate::{
    error::RemoteResult,
    models::{ActorDetail, CastMember, Genre, Movie, RemoteFilter},
};

#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn popular_movies(&self) -> RemoteResult<Vec<Movie>>;

    /// `None` when the catalog has no such movie.
    async fn movie_details(&self, id: i32) -> RemoteResult<Option<Movie>>;

    async fn movie_cast(&self, id: i32) -> RemoteResult<Vec<CastMember>>;

    /// Resolves to [`RemoteError::Cancelled`](crate::error::RemoteError::Cancelled)
    /// as soon as `cancel` fires.
    async fn search_movies(&self, text: &str, cancel: &CancellationToken)
    -> RemoteResult<Vec<Movie>>;

    async fn genres(&self) -> RemoteResult<Vec<Genre>>;

    async fn movies_filtered(&self, filter: &RemoteFilter) -> RemoteResult<Vec<Movie>>;

    async fn actor_details(&self, id: i32) -> RemoteResult<Option<ActorDetail>>;

    async fn actor_movies(&self, id: i32) -> RemoteResult<Vec<Movie>>;
}
