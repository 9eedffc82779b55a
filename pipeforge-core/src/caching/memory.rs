//! In-memory cache backend.
//!
//! Unbounded by default. With a capacity it becomes an LRU cache: a hit
//! refreshes the entry and an insert past capacity evicts the least
//! recently used one.
//!
//! `clear` drops the entries but keeps the hit/miss counters, so statistics
//! describe the whole lifetime of the cache. Use [`InMemoryCache::reset_stats`]
//! to zero them explicitly.

use std::{
    collections::HashMap,
    num::NonZeroUsize,
    sync::atomic::{AtomicU64, Ordering},
};

use lru::LruCache;
use parking_lot::Mutex;

use super::{Cache, CacheLookup, CacheStats, CachedOutput};
use crate::core::{PipelineError, Result};

enum Store {
    Unbounded(HashMap<String, CachedOutput>),
    Lru(LruCache<String, CachedOutput>),
}

/// Thread-safe in-memory cache with hit/miss statistics.
pub struct InMemoryCache {
    store: Mutex<Store>,
    stats: CacheStatistics,
}

/// Thread-safe statistics tracking.
#[derive(Debug, Default)]
struct CacheStatistics {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl InMemoryCache {
    /// Create a new unbounded cache.
    pub fn new() -> Self {
        Self {
            store: Mutex::new(Store::Unbounded(HashMap::new())),
            stats: CacheStatistics::default(),
        }
    }

    /// Create an LRU cache holding at most `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| PipelineError::Config {
            message: "cache capacity must be greater than 0".to_string(),
        })?;
        Ok(Self {
            store: Mutex::new(Store::Lru(LruCache::new(capacity))),
            stats: CacheStatistics::default(),
        })
    }

    /// Number of entries evicted to respect the capacity.
    pub fn evictions(&self) -> u64 {
        self.stats.evictions.load(Ordering::Relaxed)
    }

    /// Zero the hit, miss and eviction counters.
    pub fn reset_stats(&self) {
        self.stats.hits.store(0, Ordering::Relaxed);
        self.stats.misses.store(0, Ordering::Relaxed);
        self.stats.evictions.store(0, Ordering::Relaxed);
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        match &*self.store.lock() {
            Store::Unbounded(map) => map.len(),
            Store::Lru(lru) => lru.len(),
        }
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return mode description for logging.
    pub fn mode_description(&self) -> &'static str {
        match &*self.store.lock() {
            Store::Unbounded(_) => "in-memory (unbounded)",
            Store::Lru(_) => "in-memory (lru)",
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCache")
            .field("mode", &self.mode_description())
            .field("stats", &self.stats())
            .finish()
    }
}

impl Cache for InMemoryCache {
    fn get(&self, key: &str) -> CacheLookup {
        let found = match &mut *self.store.lock() {
            Store::Unbounded(map) => map.get(key).cloned(),
            Store::Lru(lru) => lru.get(key).cloned(),
        };
        match found {
            Some(value) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                CacheLookup::Hit(value)
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                CacheLookup::Miss
            }
        }
    }

    fn set(&self, key: String, value: CachedOutput) {
        match &mut *self.store.lock() {
            Store::Unbounded(map) => {
                map.insert(key, value);
            }
            Store::Lru(lru) => {
                if let Some((evicted, _)) = lru.push(key.clone(), value) {
                    // push returns the replaced entry for an existing key too
                    if evicted != key {
                        self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(key = %evicted, "Evicted cache entry");
                    }
                }
            }
        }
    }

    fn contains(&self, key: &str) -> bool {
        match &*self.store.lock() {
            Store::Unbounded(map) => map.contains_key(key),
            Store::Lru(lru) => lru.contains(key),
        }
    }

    fn clear(&self) {
        match &mut *self.store.lock() {
            Store::Unbounded(map) => map.clear(),
            Store::Lru(lru) => lru.clear(),
        }
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            size: self.len(),
        }
    }
}
