use std::sync::Arc;

use filmsync::{
    AppState,
    config::Config,
    connectivity::{Connectivity, ManualSwitch, RouteProbe},
    db, routes,
    remote::{CatalogClient, DemoCatalog, RemoteSource},
    session::CatalogSession,
    store::CatalogStore,
    sync::Synchronizer,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,filmsync=debug,sqlx=warn".to_string()),
        )
        .init();

    let config = Arc::new(Config::from_env()?);

    let db = db::connect_and_migrate(&config.database_url).await?;
    let store = CatalogStore::new(db);

    let remote: Arc<dyn RemoteSource> = if config.uses_demo_catalog() {
        Arc::new(DemoCatalog::new())
    } else {
        let http = reqwest::Client::builder()
            .user_agent(concat!("filmsync/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()?;
        Arc::new(CatalogClient::new(
            http,
            config.catalog_base_url.clone(),
            config.media_base_url.clone(),
            config.catalog_rps,
        ))
    };

    let connectivity: Arc<dyn Connectivity> = if config.force_offline {
        tracing::warn!("FORCE_OFFLINE set, serving from cache only");
        Arc::new(ManualSwitch::new(false))
    } else {
        Arc::new(RouteProbe::new(config.connectivity_probe))
    };

    let sync = Synchronizer::new(store, remote, connectivity);
    let session = Arc::new(CatalogSession::new(sync, config.search_debounce));
    let _favorites_observer = session.spawn_favorites_observer();

    let state = Arc::new(AppState { config: config.clone(), session });
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
