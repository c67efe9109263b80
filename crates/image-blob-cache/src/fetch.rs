//! Remote blob fetching

use crate::error::{CacheError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const DEFAULT_USER_AGENT: &str = "image-blob-cache/0.1";

/// Turns a URL into raw bytes
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>>;
}

/// HTTP client for fetching remote blobs
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a new fetcher with a default client
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Create a new fetcher that identifies itself with `user_agent`
    pub fn with_user_agent(user_agent: &str) -> Result<Self> {
        let client = Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str, timeout: Duration) -> Result<Vec<u8>> {
        let parsed = Url::parse(url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(CacheError::InvalidUrl(format!(
                "Unsupported scheme: {}",
                parsed.scheme()
            )));
        }

        debug!(url = %url, timeout_ms = timeout.as_millis() as u64, "Fetching remote blob");

        let response = self
            .client
            .get(parsed)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        if !response.status().is_success() {
            warn!(status = %response.status(), url = %url, "Failed to fetch blob");
            return Err(CacheError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| classify(url, e))?
            .to_vec();

        debug!(url = %url, size = data.len(), "Fetched remote blob");
        Ok(data)
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::with_user_agent(DEFAULT_USER_AGENT).unwrap_or_else(|_| Self::new())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>> {
        self.get(url, timeout).await
    }
}

fn classify(url: &str, err: reqwest::Error) -> CacheError {
    if err.is_timeout() {
        CacheError::Timeout(url.to_string())
    } else {
        err.into()
    }
}
