//! Per-run execution context handed to every stage.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    async_processing::{ConcurrencyLimiter, RetryPolicy},
    caching::Cache,
    config::ExecutionConfig,
    core::Provider,
};

/// Everything a run shares across its stages: the optional provider and
/// cache, execution settings and a cancellation token.
///
/// Cloning is cheap. Clones share the provider, cache, token and the
/// provider-call limiter, so concurrent runs over one context stay within
/// `max_concurrent_generations` in total.
#[derive(Clone)]
pub struct RunContext {
    provider: Option<Arc<dyn Provider>>,
    cache: Option<Arc<dyn Cache>>,
    config: Arc<ExecutionConfig>,
    limiter: ConcurrencyLimiter,
    cancel: CancellationToken,
}

impl Default for RunContext {
    fn default() -> Self {
        let config = ExecutionConfig::default();
        Self {
            provider: None,
            cache: None,
            limiter: ConcurrencyLimiter::new(config.max_concurrent_generations),
            config: Arc::new(config),
            cancel: CancellationToken::new(),
        }
    }
}

impl RunContext {
    /// Context with no provider, no cache and default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `provider` for generative stages.
    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Memoize stage outputs in `cache`.
    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Replace the execution settings. Resets the provider-call limiter.
    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.limiter = ConcurrencyLimiter::new(config.max_concurrent_generations);
        self.config = Arc::new(config);
        self
    }

    /// Observe `token` for cancellation instead of a private one.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The configured provider, if any.
    pub fn provider(&self) -> Option<&Arc<dyn Provider>> {
        self.provider.as_ref()
    }

    /// The run-wide cache, if any.
    pub fn cache(&self) -> Option<&Arc<dyn Cache>> {
        self.cache.as_ref()
    }

    /// Execution settings.
    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Token cancelled when the run should stop.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the run has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Retry schedule derived from the configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.config.retry)
    }

    /// Limiter sized by `max_concurrent_generations`, shared by clones.
    pub fn concurrency_limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("provider", &self.provider.as_ref().map(|p| p.identity()))
            .field("cache", &self.cache.as_ref().map(|c| c.stats()))
            .field("config", &self.config)
            .field("available_permits", &self.limiter.available_permits())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
