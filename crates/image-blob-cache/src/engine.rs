//! Storage operations over the metadata index
//!
//! The engine is a single-actor value: every mutating operation takes
//! `&mut self`, and callers sharing one engine must serialize access
//! themselves (see [`crate::ImageCache`]). Payloads live at
//! `{storage_folder}/{key}`; the index, not the filesystem, decides what is
//! cached.

use crate::error::{CacheError, Result};
use crate::index::{EntryStore, MetadataIndex};
use crate::key::derive_key;
use crate::types::{CacheConfiguration, CacheEntry, CacheStats, ConfigureOptions};
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

pub struct CacheEngine {
    config: CacheConfiguration,
    index: MetadataIndex,
}

impl CacheEngine {
    pub fn new(config: CacheConfiguration, index: MetadataIndex) -> Self {
        Self { config, index }
    }

    /// Load the index from `store` and build an engine around it
    pub async fn open(config: CacheConfiguration, store: Arc<dyn EntryStore>) -> Self {
        let index = MetadataIndex::load(store).await;
        info!(
            root_folder = ?config.root_folder,
            entries = index.len(),
            total_size = index.total_size(),
            "Cache engine opened"
        );
        Self::new(config, index)
    }

    pub fn config(&self) -> &CacheConfiguration {
        &self.config
    }

    /// Merge `options` into this engine's configuration. Existing entries keep
    /// the TTL and folder they were stored with.
    pub fn configure(&mut self, options: ConfigureOptions) {
        self.config.apply(options);
        if self.config.debug_logging {
            debug!(config = ?self.config, "Cache configuration updated");
        }
    }

    pub fn index(&self) -> &MetadataIndex {
        &self.index
    }

    pub fn entry(&self, key: &str) -> Option<&CacheEntry> {
        self.index.find(key)
    }

    pub fn has_entry(&self, key: &str) -> bool {
        if self.config.debug_logging {
            debug!(key = %key, "Checking cache index");
        }
        self.index.contains(key)
    }

    /// Sum of recorded entry sizes; does not stat the files
    pub fn total_size(&self) -> u64 {
        self.index.total_size()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.index.len(),
            total_size: self.index.total_size(),
        }
    }

    /// Store `payload` under `key`.
    ///
    /// Returns `Ok(false)` without touching the payload when `key` is already
    /// cached: the first write for a key wins.
    pub async fn store(&mut self, key: &str, payload: &[u8]) -> Result<bool> {
        let root = self.config.root_folder.clone();
        fs::create_dir_all(&root).await?;

        if self.index.contains(key) {
            if self.config.debug_logging {
                debug!(key = %key, "Already cached, discarding payload");
            }
            return Ok(false);
        }

        fs::write(root.join(key), payload).await?;

        let entry = CacheEntry {
            key: key.to_string(),
            created_at: Utc::now(),
            ttl_seconds: self.config.default_ttl_seconds,
            size_bytes: payload.len() as u64,
            storage_folder: root,
        };
        self.index.add(entry).await?;

        if self.config.debug_logging {
            debug!(
                key = %key,
                size = payload.len(),
                ttl_secs = self.config.default_ttl_seconds,
                remote_backup = self.config.remote_backup_enabled,
                "Cached blob"
            );
        }
        Ok(true)
    }

    /// Read the payload for `key`. Expiry is not checked here.
    ///
    /// An indexed entry whose file has vanished is dropped from the index and
    /// reported as [`CacheError::NotFound`].
    pub async fn read(&mut self, key: &str) -> Result<Vec<u8>> {
        let path = match self.index.find(key) {
            Some(entry) => entry.path(),
            None => return Err(CacheError::NotFound(key.to_string())),
        };

        match fs::read(&path).await {
            Ok(data) => {
                if self.config.debug_logging {
                    debug!(key = %key, size = data.len(), "Read cached blob");
                }
                Ok(data)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(key = %key, path = ?path, "Cached file missing, removing stale entry");
                self.index.remove(key).await?;
                Err(CacheError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the payload and index entry for `key`.
    ///
    /// `Ok(true)` when a file was deleted. `Ok(false)` when nothing is indexed
    /// or the file was already gone; in the latter case the stale entry is
    /// still dropped. A failed delete leaves the index untouched and is the
    /// only error this returns. Once the file is gone the entry leaves the
    /// index even if persisting the index fails; that failure is logged.
    pub async fn remove_file(&mut self, key: &str) -> Result<bool> {
        let path = match self.index.find(key) {
            Some(entry) => entry.path(),
            None => return Ok(false),
        };

        if self.config.debug_logging {
            debug!(key = %key, path = ?path, "Removing cached file");
        }

        match fs::remove_file(&path).await {
            Ok(()) => {
                self.drop_entry(key).await;
                if self.config.debug_logging {
                    debug!(key = %key, "Cached file removed");
                }
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(key = %key, "Cached file already removed, dropping entry");
                self.drop_entry(key).await;
                Ok(false)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to delete cached file");
                Err(e.into())
            }
        }
    }

    async fn drop_entry(&mut self, key: &str) {
        if let Err(e) = self.index.remove(key).await {
            warn!(key = %key, error = %e, "Failed to persist index after removal");
        }
    }

    pub async fn remove_by_url(&mut self, url: &str) -> Result<bool> {
        self.remove_file(&derive_key(url)).await
    }

    /// Remove every entry. Returns how many entries left the index.
    pub async fn clear(&mut self) -> usize {
        if self.config.debug_logging {
            debug!(entries = self.index.len(), "Clearing cache");
        }

        let snapshot = self.index.snapshot();
        self.remove_all(snapshot.iter().map(|e| e.key.as_str()))
            .await
    }

    pub async fn sweep_expired(&mut self) -> usize {
        self.sweep_expired_at(Utc::now()).await
    }

    /// Remove entries expired at `now`. Only entries present when the sweep
    /// starts are considered.
    pub async fn sweep_expired_at(&mut self, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = self
            .index
            .entries()
            .iter()
            .filter(|e| e.is_expired_at(now))
            .map(|e| e.key.clone())
            .collect();

        if self.config.debug_logging {
            debug!(expired = expired.len(), "Sweeping expired entries");
        }

        self.remove_all(expired.iter().map(String::as_str)).await
    }

    async fn remove_all<'a>(&mut self, keys: impl Iterator<Item = &'a str>) -> usize {
        let mut removed = 0;
        for key in keys {
            match self.remove_file(key).await {
                Ok(_) => removed += 1,
                Err(e) => warn!(key = %key, error = %e, "Leaving entry in cache"),
            }
        }
        removed
    }
}
