//! URL-keyed disk cache for remote image blobs
//!
//! Stores fetched bytes as one file per key under a root folder, tracks them
//! in a persisted metadata index, and evicts them by time-based expiry.
//! Each URL is fetched at most once while its entry is indexed.

mod cache;
mod engine;
mod error;
mod fetch;
mod index;
mod key;
mod types;

pub use cache::{CompletionCallback, ImageCache, DEFAULT_FETCH_TIMEOUT};
pub use engine::CacheEngine;
pub use error::{CacheError, Result};
pub use fetch::{Fetcher, HttpFetcher};
pub use index::{EntryStore, JsonFileStore, MemoryEntryStore, MetadataIndex, INDEX_NAMESPACE};
pub use key::derive_key;
pub use types::{CacheConfiguration, CacheEntry, CacheStats, ConfigureOptions, DEFAULT_TTL_SECS};
