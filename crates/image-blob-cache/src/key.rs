//! Cache key derivation

use sha2::{Digest, Sha256};

/// Derive the cache key for a source URL.
///
/// The key is the lowercase hex SHA-256 digest of the URL string. It doubles
/// as the payload's file name under the cache root.
pub fn derive_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_key_is_stable() {
        let key1 = derive_key("https://example.com/cat.png");
        let key2 = derive_key("https://example.com/cat.png");
        assert_eq!(key1, key2);
    }

    #[test]
    fn test_derive_key_distinguishes_urls() {
        let key1 = derive_key("https://example.com/cat.png");
        let key2 = derive_key("https://example.com/dog.png");
        let key3 = derive_key("https://example.com/cat.png?size=large");
        assert_ne!(key1, key2);
        assert_ne!(key1, key3);
    }

    #[test]
    fn test_derive_key_format() {
        let key = derive_key("https://example.com/cat.png");

        // Keys are hex strings (64 chars for SHA256)
        assert_eq!(key.len(), 64);
        assert!(key
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_derive_key_known_vector() {
        // SHA-256 of the empty string
        assert_eq!(
            derive_key(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
