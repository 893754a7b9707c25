//! Cache key derivation.

use sha2::{Digest, Sha256};
use url::Url;

/// Fixed-length digest of a fully-qualified request URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key from the URL's canonical serialization
    /// (scheme, host, port, path and query).
    pub fn from_url(url: &Url) -> Self {
        let digest = Sha256::digest(url.as_str().as_bytes());
        Self(hex::encode(digest))
    }

    /// Hex form of the digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> CacheKey {
        CacheKey::from_url(&Url::parse(s).unwrap())
    }

    #[test]
    fn same_url_same_key() {
        assert_eq!(key("http://example.com/a?b=1"), key("http://example.com/a?b=1"));
    }

    #[test]
    fn digest_is_fixed_length_hex() {
        let short = key("http://a.io/");
        let long = key("http://example.com/a/very/long/path/with/segments?and=a&query=string");
        assert_eq!(short.as_str().len(), 64);
        assert_eq!(long.as_str().len(), 64);
        assert!(short.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_urls_different_keys() {
        assert_ne!(key("http://example.com/a"), key("http://example.com/b"));
        assert_ne!(key("http://example.com/a"), key("http://example.org/a"));
        assert_ne!(key("http://example.com:8080/a"), key("http://example.com:8081/a"));
    }

    #[test]
    fn single_query_character_changes_key() {
        assert_ne!(key("http://example.com/p?q=1"), key("http://example.com/p?q=2"));
    }

    #[test]
    fn canonical_form_absorbs_default_port_and_case() {
        // The URL parser lowercases the host and drops the scheme default port.
        assert_eq!(key("http://EXAMPLE.com:80/x"), key("http://example.com/x"));
    }
}
