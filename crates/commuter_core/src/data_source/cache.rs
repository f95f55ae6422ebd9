//! TTL cache for data-source list responses.
//!
//! Keyed by request path + filter string; entries hold the raw JSON items of
//! a fully paginated fetch. A successful refetch replaces the entry and
//! restarts its TTL.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde_json::Value;

const CACHE_CAPACITY: usize = 64;

struct Entry {
    fetched_at: Instant,
    items: Vec<Value>,
}

pub struct ResponseCache {
    entries: LruCache<String, Entry>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).expect("cache size must be non-zero"),
            ),
            ttl,
        }
    }

    /// Cached items for a key if the entry is still fresh.
    pub fn get(&mut self, key: &str) -> Option<Vec<Value>> {
        match self.entries.get(key) {
            Some(entry) if entry.fetched_at.elapsed() < self.ttl => Some(entry.items.clone()),
            Some(_) => {
                self.entries.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&mut self, key: String, items: Vec<Value>) {
        self.entries.put(
            key,
            Entry {
                fetched_at: Instant::now(),
                items,
            },
        );
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
