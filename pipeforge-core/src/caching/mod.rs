//! Memoization layer for stage outputs
//!
//! A [`Cache`] maps a content fingerprint (stage logic + row inputs +
//! provider identity, see [`cache_key`]) to the output tuple a stage
//! produced for that row. Stages consult it row by row, so identical rows
//! are computed once and repeated runs over the same data are free.
//!
//! ## Usage
//!
//! ```rust
//! use pipeforge_core::caching::{Cache, CacheLookup, InMemoryCache};
//! use serde_json::json;
//!
//! let cache = InMemoryCache::new();
//! assert!(matches!(cache.get("k"), CacheLookup::Miss));
//!
//! // A stored null is still a hit.
//! cache.set("k".to_string(), vec![json!(null)]);
//! assert!(cache.get("k").is_hit());
//!
//! let stats = cache.stats();
//! assert_eq!((stats.hits, stats.misses, stats.size), (1, 1, 1));
//! ```

pub mod cache_config;
pub mod cache_key;
pub mod memory;

pub use cache_config::{CacheConfig, EvictionPolicy};
pub use cache_key::{provider_fingerprint, ContentHashable, FingerprintBuilder};
pub use memory::InMemoryCache;

use serde::{Deserialize, Serialize};

use crate::core::Value;

/// The output tuple stored for one row, one value per output column.
pub type CachedOutput = Vec<Value>;

/// Result of a cache lookup.
///
/// Carries the found flag separately from the payload, so a stored
/// `[null]` is distinguishable from an absent key.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// The key was present
    Hit(CachedOutput),
    /// The key was absent
    Miss,
}

impl CacheLookup {
    /// Whether the lookup found an entry.
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }

    /// The stored tuple, if any.
    pub fn into_option(self) -> Option<CachedOutput> {
        match self {
            CacheLookup::Hit(value) => Some(value),
            CacheLookup::Miss => None,
        }
    }
}

/// Externally observable cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups that found an entry
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Entries currently stored
    pub size: usize,
}

impl CacheStats {
    /// Calculate hit rate as a fraction in `[0, 1]`.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Key-value memo store shared by the stages of a run.
///
/// Implementations must be safe to call from concurrently running row
/// tasks. Writes for the same key are idempotent; the last one wins.
pub trait Cache: Send + Sync {
    /// Look up a key, counting a hit or a miss.
    fn get(&self, key: &str) -> CacheLookup;

    /// Store a value, replacing any previous one.
    fn set(&self, key: String, value: CachedOutput);

    /// Whether a key is present. Does not touch the counters.
    fn contains(&self, key: &str) -> bool;

    /// Drop every entry.
    fn clear(&self);

    /// Current hit/miss/size counters.
    fn stats(&self) -> CacheStats;
}
