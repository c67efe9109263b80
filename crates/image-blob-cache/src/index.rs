//! Metadata index of cached entries and its durable slot

use crate::error::Result;
use crate::types::CacheEntry;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Fixed namespace of the persisted entry list
pub const INDEX_NAMESPACE: &str = "image_cache.image_list";

/// Durable slot holding the full entry set
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Read every persisted entry
    async fn load(&self) -> Result<Vec<CacheEntry>>;

    /// Overwrite the slot with `entries`
    async fn persist(&self, entries: &[CacheEntry]) -> Result<()>;
}

/// Entry set stored as a single JSON document on disk
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store the document under the fixed namespace inside `dir`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(format!("{}.json", INDEX_NAMESPACE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EntryStore for JsonFileStore {
    async fn load(&self) -> Result<Vec<CacheEntry>> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, entries: &[CacheEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write then rename so a crash never leaves a torn document
        let json = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// In-process entry set, for tests and caches that need no durability
#[derive(Debug, Clone, Default)]
pub struct MemoryEntryStore {
    entries: Arc<Mutex<Vec<CacheEntry>>>,
}

impl MemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<CacheEntry>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(entries)),
        }
    }

    /// Last persisted entry set
    pub async fn entries(&self) -> Vec<CacheEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl EntryStore for MemoryEntryStore {
    async fn load(&self) -> Result<Vec<CacheEntry>> {
        Ok(self.entries.lock().await.clone())
    }

    async fn persist(&self, entries: &[CacheEntry]) -> Result<()> {
        *self.entries.lock().await = entries.to_vec();
        Ok(())
    }
}

/// Ordered collection of cache entries, flushed to its store after every mutation
pub struct MetadataIndex {
    entries: Vec<CacheEntry>,
    store: Arc<dyn EntryStore>,
}

impl MetadataIndex {
    /// Load the index from `store`. An absent or unreadable slot yields an empty index.
    pub async fn load(store: Arc<dyn EntryStore>) -> Self {
        let entries = match store.load().await {
            Ok(entries) => dedupe(entries),
            Err(e) => {
                warn!(error = %e, "Failed to load cache index, starting empty");
                Vec::new()
            }
        };

        debug!(entries = entries.len(), "Loaded cache index");
        Self { entries, store }
    }

    /// Overwrite the durable slot with the current entry set
    pub async fn persist(&self) -> Result<()> {
        self.store.persist(&self.entries).await
    }

    pub fn find(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    /// Append an entry whose key the caller has checked is not yet present
    pub async fn add(&mut self, entry: CacheEntry) -> Result<()> {
        debug_assert!(!self.contains(&entry.key), "duplicate cache key");
        self.entries.push(entry);
        self.persist().await
    }

    /// Remove the record for `key`; persists only when something was removed
    pub async fn remove(&mut self, key: &str) -> Result<Option<CacheEntry>> {
        let Some(pos) = self.entries.iter().position(|e| e.key == key) else {
            return Ok(None);
        };

        let entry = self.entries.remove(pos);
        self.persist().await?;
        Ok(Some(entry))
    }

    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    /// Owned copy of the entries, for passes that remove while iterating
    pub fn snapshot(&self) -> Vec<CacheEntry> {
        self.entries.clone()
    }

    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size_bytes).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// First record wins when a slot holds the same key twice
fn dedupe(entries: Vec<CacheEntry>) -> Vec<CacheEntry> {
    let mut seen = HashSet::new();
    let total = entries.len();
    let unique: Vec<CacheEntry> = entries
        .into_iter()
        .filter(|e| seen.insert(e.key.clone()))
        .collect();

    if unique.len() != total {
        warn!(
            dropped = total - unique.len(),
            "Cache index held duplicate keys"
        );
    }
    unique
}
