//! Cache types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default cache lifetime: half a day
pub const DEFAULT_TTL_SECS: u64 = 12 * 60 * 60;

/// Metadata for a cached blob entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: u64,
    pub size_bytes: u64,
    pub storage_folder: PathBuf,
}

impl CacheEntry {
    /// Instant after which the entry counts as expired
    pub fn expires_at(&self) -> DateTime<Utc> {
        i64::try_from(self.ttl_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| self.created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// An entry is expired once `now` is strictly past `created_at + ttl`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }

    /// Location of the payload on disk
    pub fn path(&self) -> PathBuf {
        self.storage_folder.join(&self.key)
    }
}

/// Settings owned by a cache engine, applied at store time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfiguration {
    pub root_folder: PathBuf,
    pub default_ttl_seconds: u64,
    pub debug_logging: bool,
    pub remote_backup_enabled: bool,
}

impl Default for CacheConfiguration {
    fn default() -> Self {
        Self {
            root_folder: PathBuf::from("./ToCache"),
            default_ttl_seconds: DEFAULT_TTL_SECS,
            debug_logging: false,
            remote_backup_enabled: true,
        }
    }
}

impl CacheConfiguration {
    /// Merge the given options; absent fields keep their current value
    pub fn apply(&mut self, options: ConfigureOptions) {
        if let Some(root_folder) = options.root_folder {
            self.root_folder = root_folder;
        }
        if let Some(ttl) = options.default_ttl_seconds {
            self.default_ttl_seconds = ttl;
        }
        if let Some(debug) = options.debug_logging {
            self.debug_logging = debug;
        }
        if let Some(remote_backup) = options.remote_backup_enabled {
            self.remote_backup_enabled = remote_backup;
        }
    }
}

/// Partial configuration update. Unknown keys are ignored when deserializing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigureOptions {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub default_ttl_seconds: Option<u64>,
    #[serde(default)]
    pub debug_logging: Option<bool>,
    #[serde(default)]
    pub remote_backup_enabled: Option<bool>,
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: u64,
}
