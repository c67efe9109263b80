//! Core types for the image cache proxy

use image_blob_cache::{CacheStats, ConfigureOptions};
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the image cache proxy
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    pub cache_dir: PathBuf,
    pub index_dir: PathBuf,
    pub cache_ttl_secs: u64,
    pub debug_logging: bool,
    pub remote_backup: bool,
    pub fetch_timeout_ms: u64,
    /// Zero disables the periodic sweep
    pub sweep_interval_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            cache_dir: PathBuf::from("./cache/images"),
            index_dir: PathBuf::from("./cache/images"),
            cache_ttl_secs: 12 * 60 * 60, // half a day
            debug_logging: false,
            remote_backup: true,
            fetch_timeout_ms: 30_000,
            sweep_interval_secs: 300,
        }
    }
}

/// Query naming a source image
#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct PrefetchQuery {
    pub url: String,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PrefetchResponse {
    pub started: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemoveResponse {
    pub removed: bool,
}

/// Entries evicted by a clear or sweep
#[derive(Debug, Serialize, Deserialize)]
pub struct EvictionResponse {
    pub removed: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SizeResponse {
    pub total_size: u64,
}

/// Body of `PUT /config`. The cache root is fixed at startup; a body that
/// names one is rejected by the handler.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default)]
    pub root_folder: Option<IgnoredAny>,
    #[serde(default)]
    pub default_ttl_seconds: Option<u64>,
    #[serde(default)]
    pub debug_logging: Option<bool>,
    #[serde(default)]
    pub remote_backup_enabled: Option<bool>,
}

impl ConfigUpdate {
    pub fn sets_root_folder(&self) -> bool {
        self.root_folder.is_some()
    }

    pub fn into_options(self) -> ConfigureOptions {
        ConfigureOptions {
            root_folder: None,
            default_ttl_seconds: self.default_ttl_seconds,
            debug_logging: self.debug_logging,
            remote_backup_enabled: self.remote_backup_enabled,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub cache: CacheStats,
}
