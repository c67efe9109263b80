//! Error types for the image blob cache

use std::fmt;

#[derive(Debug)]
pub enum CacheError {
    /// No index entry for the key
    NotFound(String),
    Io(Box<std::io::Error>),
    Http(Box<reqwest::Error>),
    Timeout(String),
    Status { url: String, status: u16 },
    InvalidUrl(String),
    /// The persisted index could not be encoded or decoded
    Index(String),
}

impl CacheError {
    /// True for failures that came from the network collaborator
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            CacheError::Http(_) | CacheError::Timeout(_) | CacheError::Status { .. }
        )
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::NotFound(key) => write!(f, "Cache entry not found: {}", key),
            CacheError::Io(err) => write!(f, "IO error: {}", err),
            CacheError::Http(err) => write!(f, "HTTP error: {}", err),
            CacheError::Timeout(url) => write!(f, "Fetch timed out: {}", url),
            CacheError::Status { url, status } => {
                write!(f, "Fetch of {} returned status {}", url, status)
            }
            CacheError::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),
            CacheError::Index(msg) => write!(f, "Index error: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io(err) => Some(err.as_ref()),
            CacheError::Http(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(Box::new(err))
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        CacheError::Http(Box::new(err))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Index(err.to_string())
    }
}

impl From<url::ParseError> for CacheError {
    fn from(err: url::ParseError) -> Self {
        CacheError::InvalidUrl(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
