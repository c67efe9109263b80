//! Fetch-or-serve front end over a shared cache engine

use crate::engine::CacheEngine;
use crate::error::{CacheError, Result};
use crate::fetch::Fetcher;
use crate::index::EntryStore;
use crate::key::derive_key;
use crate::types::{CacheConfiguration, CacheStats, ConfigureOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Timeout applied when a caller does not pick one
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Invoked once a background fetch finishes
pub type CompletionCallback = Box<dyn FnOnce(Result<Vec<u8>>) + Send + 'static>;

/// Cloneable handle to one cache engine and its fetcher.
///
/// All engine access goes through a single lock. Network fetches run
/// outside the lock; only the store and read-back take it.
#[derive(Clone)]
pub struct ImageCache {
    engine: Arc<Mutex<CacheEngine>>,
    fetcher: Arc<dyn Fetcher>,
    fetch_timeout: Duration,
}

impl ImageCache {
    pub fn new(engine: CacheEngine, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            fetcher,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Load the index from `store` and build a cache around it
    pub async fn open(
        config: CacheConfiguration,
        store: Arc<dyn EntryStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self::new(CacheEngine::open(config, store).await, fetcher)
    }

    /// Timeout used by [`ImageCache::fetch_image`]. Zero keeps the default.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.fetch_timeout = timeout;
        }
        self
    }

    /// Apply `options` and return the resulting configuration
    pub async fn configure(&self, options: ConfigureOptions) -> CacheConfiguration {
        let mut engine = self.engine.lock().await;
        engine.configure(options);
        engine.config().clone()
    }

    pub async fn config(&self) -> CacheConfiguration {
        self.engine.lock().await.config().clone()
    }

    pub async fn total_cache_size(&self) -> u64 {
        self.engine.lock().await.total_size()
    }

    pub async fn stats(&self) -> CacheStats {
        self.engine.lock().await.stats()
    }

    pub async fn contains_url(&self, url: &str) -> bool {
        self.engine.lock().await.has_entry(&derive_key(url))
    }

    /// Remove every expired entry, returning how many were evicted
    pub async fn sweep_expired(&self) -> usize {
        self.engine.lock().await.sweep_expired().await
    }

    pub async fn clear(&self) -> usize {
        self.engine.lock().await.clear().await
    }

    pub async fn remove_by_key(&self, key: &str) -> Result<bool> {
        self.engine.lock().await.remove_file(key).await
    }

    pub async fn remove_by_url(&self, url: &str) -> Result<bool> {
        self.engine.lock().await.remove_by_url(url).await
    }

    /// Return the bytes for `url`, fetching and caching them on a miss.
    ///
    /// The caller waits for the whole fetch. A failure to cache the fetched
    /// bytes is logged and the bytes are returned anyway.
    pub async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        self.fetch_image_with_source(url).await.map(|(data, _)| data)
    }

    /// Like [`ImageCache::fetch_image`], also reporting whether the bytes
    /// were served from the cache without a fetch.
    pub async fn fetch_image_with_source(&self, url: &str) -> Result<(Vec<u8>, bool)> {
        let key = derive_key(url);

        {
            let mut engine = self.engine.lock().await;
            if engine.has_entry(&key) {
                match engine.read(&key).await {
                    Ok(data) => return Ok((data, true)),
                    Err(CacheError::NotFound(_)) => {
                        debug!(key = %key, url = %url, "Stale entry dropped, refetching");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let data = self.fetcher.fetch(url, self.fetch_timeout).await?;

        let mut engine = self.engine.lock().await;
        if let Err(e) = engine.store(&key, &data).await {
            warn!(key = %key, url = %url, error = %e, "Failed to cache image");
            return Ok((data, false));
        }

        match engine.read(&key).await {
            Ok(stored) => Ok((stored, false)),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read back cached image");
                Ok((data, false))
            }
        }
    }

    /// Fetch and cache `url` on a background task.
    ///
    /// Returns `false` when `url` is already cached; no fetch happens and
    /// `on_complete` is not called. Otherwise returns `true` and later calls
    /// `on_complete` with the stored bytes, or with the fetch or store error.
    /// A missing or zero `timeout` means [`DEFAULT_FETCH_TIMEOUT`].
    pub async fn cache_in_background(
        &self,
        url: &str,
        timeout: Option<Duration>,
        on_complete: Option<CompletionCallback>,
    ) -> bool {
        let key = derive_key(url);
        if self.engine.lock().await.has_entry(&key) {
            debug!(key = %key, url = %url, "Already cached");
            return false;
        }

        let cache = self.clone();
        let url = url.to_string();
        let timeout = timeout
            .filter(|t| !t.is_zero())
            .unwrap_or(DEFAULT_FETCH_TIMEOUT);

        tokio::spawn(async move {
            let result = cache.fetch_and_store(&key, &url, timeout).await;
            if let Err(e) = &result {
                warn!(key = %key, url = %url, error = %e, "Background fetch failed");
            }
            if let Some(on_complete) = on_complete {
                on_complete(result);
            }
        });

        true
    }

    async fn fetch_and_store(&self, key: &str, url: &str, timeout: Duration) -> Result<Vec<u8>> {
        let data = self.fetcher.fetch(url, timeout).await?;

        let mut engine = self.engine.lock().await;
        engine.store(key, &data).await?;
        engine.read(key).await
    }
}
