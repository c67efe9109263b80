//! Periodic expiry sweep

use image_blob_cache::ImageCache;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Sweep expired entries every `every`, starting immediately
pub fn spawn_sweeper(cache: ImageCache, every: Duration) -> JoinHandle<()> {
    info!(interval_secs = every.as_secs(), "Starting cache sweeper");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let removed = cache.sweep_expired().await;
            if removed > 0 {
                info!(removed, "Swept expired cache entries");
            } else {
                debug!("No expired cache entries");
            }
        }
    })
}
