//! Concurrency control for provider calls.
//!
//! A [`ConcurrencyLimiter`] caps how many generation calls run at the same
//! time. Clones share one semaphore, so the cap holds across every stage
//! and run that uses the same limiter. Permits are RAII: the slot is released
//! when the permit is dropped, including on error and cancellation paths.
//!
//! # Basic Usage
//!
//! ```rust,ignore
//! let limiter = ConcurrencyLimiter::new(4);
//! let _permit = limiter.acquire().await?;
//! // ... provider call ...
//! ```

use std::sync::Arc;

use tokio::sync::{Semaphore, SemaphorePermit};

use crate::core::{PipelineError, Result};

/// Semaphore-backed limit on simultaneous provider calls.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl ConcurrencyLimiter {
    /// Allow at most `max_concurrent` calls at once. Zero is treated as one.
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>> {
        self.semaphore
            .acquire()
            .await
            .map_err(|e| PipelineError::provider(format!("failed to acquire call permit: {e}")))
    }

    /// Slots available right now.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Configured limit.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}
