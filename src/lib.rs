pub mod changes;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod entities;
pub mod error;
pub mod filter;
pub mod models;
pub mod remote;
pub mod routes;
pub mod search;
pub mod session;
pub mod store;
pub mod sync;

use std::sync::Arc;

use crate::{config::Config, session::CatalogSession};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub session: Arc<CatalogSession>,
}
