use std::{net::SocketAddr, time::Duration};

use anyhow::Context;

const DEFAULT_CATALOG_URL: &str = "https://films.vv1zard3x.ru";

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub database_url: String,
    /// Empty selects the bundled demo catalog.
    pub catalog_base_url: String,
    pub media_base_url: String,
    pub catalog_rps: u32,
    pub request_timeout: Duration,
    pub search_debounce: Duration,
    pub connectivity_probe: SocketAddr,
    pub force_offline: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 =
            std::env::var("PORT").unwrap_or_else(|_| "3000".to_string()).parse().context("PORT")?;

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://filmsync.db?mode=rwc".to_string());

        let catalog_base_url = std::env::var("CATALOG_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_CATALOG_URL.to_string())
            .trim()
            .to_string();
        let media_base_url =
            std::env::var("MEDIA_BASE_URL").unwrap_or_else(|_| catalog_base_url.clone());

        let catalog_rps: u32 = parse_or("CATALOG_RPS", 4);
        let request_timeout_secs: u64 = parse_or("REQUEST_TIMEOUT_SECS", 30);
        let search_debounce_ms: u64 = parse_or("SEARCH_DEBOUNCE_MS", 300);

        let connectivity_probe: SocketAddr = std::env::var("CONNECTIVITY_PROBE")
            .unwrap_or_else(|_| "1.1.1.1:53".to_string())
            .parse()
            .context("CONNECTIVITY_PROBE")?;

        let force_offline = std::env::var("FORCE_OFFLINE").map(|v| is_truthy(&v)).unwrap_or(false);

        let addr: SocketAddr = format!("{host}:{port}").parse().context("HOST/PORT")?;

        Ok(Self {
            addr,
            database_url,
            catalog_base_url,
            media_base_url,
            catalog_rps,
            request_timeout: Duration::from_secs(request_timeout_secs),
            search_debounce: Duration::from_millis(search_debounce_ms),
            connectivity_probe,
            force_offline,
        })
    }

    pub fn uses_demo_catalog(&self) -> bool {
        self.catalog_base_url.is_empty()
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
