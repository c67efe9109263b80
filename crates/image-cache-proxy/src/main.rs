//! Image Cache Proxy - serves remote images from a local disk cache
//!
//! Each image URL is fetched at most once while cached; entries expire after
//! a configurable lifetime and are evicted by a periodic sweep.

mod error;
mod server;
mod sweeper;
mod types;

use crate::error::{ProxyError, Result};
use crate::server::{start_server, ServerState, SharedState};
use crate::sweeper::spawn_sweeper;
use crate::types::ProxyConfig;
use image_blob_cache::{CacheConfiguration, HttpFetcher, ImageCache, JsonFileStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

const USER_AGENT: &str = concat!("image-cache-proxy/", env!("CARGO_PKG_VERSION"));

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration from environment
    let config = load_config();

    // Initialize logging
    let level = if config.debug_logging { "debug" } else { "info" };
    let env_filter = EnvFilter::from_default_env()
        .add_directive(format!("image_cache_proxy={}", level).parse()?)
        .add_directive(format!("image_blob_cache={}", level).parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting Image Cache Proxy...");
    info!("Port: {}", config.port);
    info!("Cache dir: {:?}", config.cache_dir);
    info!("Index dir: {:?}", config.index_dir);
    info!("Cache TTL: {} seconds", config.cache_ttl_secs);

    let cache_config = CacheConfiguration {
        root_folder: config.cache_dir.clone(),
        default_ttl_seconds: config.cache_ttl_secs,
        debug_logging: config.debug_logging,
        remote_backup_enabled: config.remote_backup,
    };
    let store = Arc::new(JsonFileStore::in_dir(&config.index_dir));
    let fetcher = Arc::new(HttpFetcher::with_user_agent(USER_AGENT)?);

    let cache = ImageCache::open(cache_config, store, fetcher)
        .await
        .with_fetch_timeout(Duration::from_millis(config.fetch_timeout_ms));

    if config.sweep_interval_secs > 0 {
        spawn_sweeper(cache.clone(), Duration::from_secs(config.sweep_interval_secs));
    }

    // Create shared state
    let state: SharedState = Arc::new(ServerState::new(cache));

    // Start HTTP server (blocking)
    start_server(state, config.port)
        .await
        .map_err(|e| ProxyError::Config(format!("Server error: {}", e)))?;

    Ok(())
}

fn load_config() -> ProxyConfig {
    let defaults = ProxyConfig::default();

    let port = env_parse("PORT").unwrap_or(defaults.port);

    let cache_dir = std::env::var("CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or(defaults.cache_dir);

    let index_dir = std::env::var("INDEX_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| cache_dir.clone());

    ProxyConfig {
        port,
        cache_dir,
        index_dir,
        cache_ttl_secs: env_parse("CACHE_TTL_SECS").unwrap_or(defaults.cache_ttl_secs),
        debug_logging: env_flag("CACHE_DEBUG").unwrap_or(defaults.debug_logging),
        remote_backup: env_flag("CACHE_REMOTE_BACKUP").unwrap_or(defaults.remote_backup),
        fetch_timeout_ms: env_parse("FETCH_TIMEOUT_MS").unwrap_or(defaults.fetch_timeout_ms),
        sweep_interval_secs: env_parse("SWEEP_INTERVAL_SECS")
            .unwrap_or(defaults.sweep_interval_secs),
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse::<T>().ok())
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|s| parse_flag(&s))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
