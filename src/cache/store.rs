//! In-memory body cache keyed by [`CacheKey`].

use std::collections::HashMap;
use std::sync::Mutex;

use axum::body::Bytes;

use crate::cache::CacheKey;
use crate::observability::metrics;

/// Process-wide store of upstream response bodies.
///
/// No size bound and no eviction: an entry lives until it is overwritten or
/// the process exits.
#[derive(Debug, Default)]
pub struct CacheStore {
    entries: Mutex<HashMap<CacheKey, Bytes>>,
}

impl CacheStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the body stored under `key`.
    pub fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    /// Store `body` under `key`, replacing any previous entry.
    pub fn put(&self, key: CacheKey, body: Bytes) {
        let len = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.insert(key, body);
            entries.len()
        };
        metrics::record_cache_size(len);
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use url::Url;

    fn key(s: &str) -> CacheKey {
        CacheKey::from_url(&Url::parse(s).unwrap())
    }

    #[test]
    fn miss_on_empty_store() {
        let store = CacheStore::new();
        assert!(store.get(&key("http://example.com/")).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn put_then_get() {
        let store = CacheStore::new();
        store.put(key("http://example.com/"), Bytes::from_static(b"hello"));
        assert_eq!(store.get(&key("http://example.com/")).unwrap(), "hello");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn last_writer_wins() {
        let store = CacheStore::new();
        store.put(key("http://example.com/"), Bytes::from_static(b"first"));
        store.put(key("http://example.com/"), Bytes::from_static(b"second"));
        assert_eq!(store.get(&key("http://example.com/")).unwrap(), "second");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn concurrent_writers_keep_one_entry_per_key() {
        let store = Arc::new(CacheStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        store.put(key(&format!("http://example.com/{}", j % 10)), Bytes::from(format!("{i}")));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 10);
    }
}
