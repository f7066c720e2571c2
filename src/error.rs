use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
    /// `update_movie` precondition: the row must already exist.
    #[error("movie {0} is not stored")]
    NotFound(i32),
    #[error("malformed genre ids: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("catalog responded with status {0}")]
    Status(u16),
    #[error("request cancelled")]
    Cancelled,
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

impl RemoteError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RemoteError::Cancelled)
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Superseded or cancelled by the caller. Never shown to the user.
    #[error("operation cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    source: anyhow::Error,
}

impl AppError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self { status: StatusCode::NOT_FOUND, source: anyhow::anyhow!("{what} not found") }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.source.fmt(f)
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, source: err }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        let status = match err {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, source: anyhow::Error::new(err) }
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Store(err) => err.into(),
            SyncError::Cancelled => {
                Self { status: StatusCode::CONFLICT, source: anyhow::Error::new(err) }
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(error = %self.source, "request failed");
        }
        let body = serde_json::json!({ "error": self.source.to_string() });
        (self.status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
