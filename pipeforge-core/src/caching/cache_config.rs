//! Cache configuration and policy management

use std::sync::Arc;

use super::{Cache, InMemoryCache};
use crate::core::{PipelineError, Result};

/// Cache eviction policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(clippy::upper_case_acronyms)]
pub enum EvictionPolicy {
    /// Keep every entry until `clear` is called
    #[default]
    Unbounded,
    /// Least Recently Used - evict the entry untouched the longest once
    /// `max_entries` is reached
    LRU,
}

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Eviction policy to use
    pub eviction: EvictionPolicy,

    /// Maximum number of entries (required for LRU)
    pub max_entries: Option<usize>,
}

impl CacheConfig {
    /// Unbounded in-memory cache.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// LRU cache holding at most `max_entries` entries.
    pub fn lru(max_entries: usize) -> Self {
        Self {
            eviction: EvictionPolicy::LRU,
            max_entries: Some(max_entries),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match (self.eviction, self.max_entries) {
            (EvictionPolicy::LRU, None) => Err(PipelineError::Config {
                message: "cache.max_entries is required for the lru eviction policy".to_string(),
            }),
            (EvictionPolicy::LRU, Some(0)) => Err(PipelineError::Config {
                message: "cache.max_entries must be greater than 0".to_string(),
            }),
            (EvictionPolicy::Unbounded, Some(_)) => Err(PipelineError::Config {
                message: "cache.max_entries has no effect without an eviction policy".to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Build the cache this configuration describes.
    pub fn build(&self) -> Result<Arc<dyn Cache>> {
        self.validate()?;
        let cache = match (self.eviction, self.max_entries) {
            (EvictionPolicy::LRU, Some(capacity)) => InMemoryCache::with_capacity(capacity)?,
            _ => InMemoryCache::new(),
        };
        Ok(Arc::new(cache))
    }
}
