//! Async processing utilities for provider calls
//!
//! This module provides:
//! - Concurrency limiting for row-level fan-out ([`ConcurrencyLimiter`])
//! - Bounded retry with exponential backoff and cancellation ([`RetryPolicy`])

pub mod rate_limiting;
pub mod retry;

pub use rate_limiting::ConcurrencyLimiter;
pub use retry::RetryPolicy;
