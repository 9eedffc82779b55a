//! Execution configuration.
//!
//! Pipelines themselves are built in code; this covers the knobs that shape
//! how they run: provider fan-out, retry schedule and the default cache.
//!
//! ```toml
//! max_concurrent_generations = 4
//!
//! [retry]
//! max_attempts = 5
//! initial_backoff_ms = 200
//!
//! [cache]
//! eviction = "lru"
//! max_entries = 10000
//! ```

pub mod loader;

pub use loader::{load_config, ConfigFormat};

use serde::{Deserialize, Serialize};

use crate::{caching::CacheConfig, config_error, core::Result};

/// Retry settings for provider calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per row, including the first call
    pub max_attempts: u32,
    /// Delay after the first failure, in milliseconds
    pub initial_backoff_ms: u64,
    /// Upper bound for any single delay, in milliseconds
    pub max_backoff_ms: u64,
    /// Growth factor applied per failed attempt
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 2_000,
            multiplier: 2.0,
        }
    }
}

/// Runtime configuration for pipeline execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Maximum provider calls in flight within one generative stage
    pub max_concurrent_generations: usize,

    /// Retry schedule for failed provider calls
    pub retry: RetryConfig,

    /// Cache built by [`CacheConfig::build`] when a caller asks for one
    pub cache: CacheConfig,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_generations: 8,
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl ExecutionConfig {
    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_generations == 0 {
            return Err(config_error!(
                "max_concurrent_generations must be greater than 0"
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(config_error!("retry.max_attempts must be at least 1"));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(config_error!(
                "retry.multiplier must be a finite number >= 1.0, got {}",
                self.retry.multiplier
            ));
        }
        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(config_error!(
                "retry.max_backoff_ms ({}) is smaller than retry.initial_backoff_ms ({})",
                self.retry.max_backoff_ms,
                self.retry.initial_backoff_ms
            ));
        }
        self.cache.validate()
    }

    /// Parse and validate a TOML document.
    #[cfg(feature = "toml-support")]
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| {
            config_error!("failed to parse TOML configuration: {e}")
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content).map_err(|e| {
            config_error!("failed to parse JSON configuration: {e}")
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file, choosing the format by extension.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        load_config(path.as_ref())
    }
}
