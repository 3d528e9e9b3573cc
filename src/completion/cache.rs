//! Response cache for the completion layer
//!
//! Keyed by normalized transcript, bounded two ways: entries older than the
//! TTL are ignored and dropped on read, and an LRU cap keeps sustained
//! unique-input load from growing the map without bound.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

/// A cached completion response
#[derive(Debug)]
struct CacheEntry {
    text: String,
    created_at: Instant,
}

/// TTL + LRU response cache, process-lifetime, owned by the request layer
#[derive(Debug)]
pub struct ResponseCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl ResponseCache {
    /// Create a cache with the given entry cap and time-to-live
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Build a cache key: trimmed, case-folded transcript, locale-prefixed
    /// so a locale switch never serves a reply from the other locale.
    #[must_use]
    pub fn key(transcript: &str, locale: &str) -> String {
        format!("{locale}:{}", transcript.trim().to_lowercase())
    }

    /// Look up a fresh entry, dropping it if expired
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let fresh = entries
            .get(key)
            .is_some_and(|entry| entry.created_at.elapsed() <= self.ttl);

        if fresh {
            return entries.get(key).map(|entry| entry.text.clone());
        }

        entries.pop(key);
        None
    }

    /// Store a response under the given key
    pub fn insert(&self, key: String, text: String) {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        entries.put(
            key,
            CacheEntry {
                text,
                created_at: Instant::now(),
            },
        );
    }

    /// Number of live entries (expired ones may still be counted until read)
    #[must_use]
    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Whether the cache holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
