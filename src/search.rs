//! Search-as-you-type: one in-flight search per slot, latest wins.

use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    error::{SyncError, SyncResult},
    models::Movie,
    sync::Synchronizer,
};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

pub struct SearchSupervisor {
    debounce: Duration,
    current: Mutex<Option<CancellationToken>>,
}

impl SearchSupervisor {
    pub fn new(debounce: Duration) -> Self {
        Self { debounce, current: Mutex::new(None) }
    }

    /// Cancels whatever search is still running in this slot and returns
    /// the token for the new one.
    pub fn supersede(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }
        token
    }

    /// Waits out the quiet period, then searches.
    ///
    /// Returns [`SyncError::Cancelled`] when a newer search supersedes this
    /// one at any point, including after the remote call has completed; a
    /// superseded result is never handed back.
    pub async fn search(&self, sync: &Synchronizer, query: &str) -> SyncResult<Vec<Movie>> {
        let token = self.supersede();

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(query = %query, "search superseded during debounce");
                return Err(SyncError::Cancelled);
            },
            _ = tokio::time::sleep(self.debounce) => {},
        }

        let result = sync.search_movies(query, &token).await;
        if token.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        result
    }

    /// True when no search owns the slot, i.e. the last one was cancelled
    /// outright rather than superseded.
    pub fn is_idle(&self) -> bool {
        self.current.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }

    /// Cancels the in-flight search, if any.
    pub fn cancel(&self) {
        if let Some(token) = self.current.lock().unwrap_or_else(PoisonError::into_inner).take() {
            token.cancel();
        }
    }
}

impl Default for SearchSupervisor {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}
