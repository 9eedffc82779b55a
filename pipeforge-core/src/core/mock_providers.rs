//! Deterministic mock providers for offline testing
//!
//! # Providers
//!
//! - [`MockProvider`] — Returns canned responses keyed by the content of the
//!   last message, with a configurable default. Counts calls so tests can
//!   assert that filtered or cached rows never reach the provider.
//! - [`FailingProvider`] — Fails a fixed number of calls before succeeding,
//!   for exercising the retry policy.

use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use serde::Serialize;

use crate::{
    caching::provider_fingerprint,
    core::{
        traits::{Message, Provider},
        PipelineError, Result,
    },
};

/// A provider with canned responses.
#[derive(Debug, Default)]
pub struct MockProvider {
    default_response: String,
    responses: BTreeMap<String, String>,
    latency: Option<Duration>,
    calls: AtomicU64,
}

/// The part of a mock's state that affects its output.
#[derive(Serialize)]
struct MockIdentity<'a> {
    default_response: &'a str,
    responses: &'a BTreeMap<String, String>,
}

impl MockProvider {
    /// Create a mock answering every request with `default_response`.
    pub fn new(default_response: impl Into<String>) -> Self {
        Self {
            default_response: default_response.into(),
            ..Default::default()
        }
    }

    /// Answer `response` when the last message's content equals `prompt`.
    pub fn with_response(mut self, prompt: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses.insert(prompt.into(), response.into());
        self
    }

    /// Sleep this long before answering, to make concurrency observable.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of `generate` calls served so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn generate(&self, messages: &[Message]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let response = messages
            .last()
            .and_then(|m| self.responses.get(&m.content))
            .unwrap_or(&self.default_response);
        Ok(response.clone())
    }

    fn identity(&self) -> String {
        provider_fingerprint(
            "MockProvider",
            &MockIdentity {
                default_response: &self.default_response,
                responses: &self.responses,
            },
        )
    }
}

/// A provider that fails its first `failures` calls.
#[derive(Debug)]
pub struct FailingProvider {
    failures: u64,
    response: String,
    calls: AtomicU64,
}

impl FailingProvider {
    /// Fail `failures` times, then answer `response`.
    pub fn new(failures: u64, response: impl Into<String>) -> Self {
        Self {
            failures,
            response: response.into(),
            calls: AtomicU64::new(0),
        }
    }

    /// A provider that never succeeds.
    pub fn always() -> Self {
        Self::new(u64::MAX, "")
    }

    /// Number of `generate` calls attempted so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for FailingProvider {
    async fn generate(&self, _messages: &[Message]) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(PipelineError::provider(format!(
                "simulated failure #{}",
                call + 1
            )));
        }
        Ok(self.response.clone())
    }

    fn identity(&self) -> String {
        provider_fingerprint("FailingProvider", &self.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_provider_maps_last_message() {
        let provider = MockProvider::new("default").with_response("hi", "hello");
        let reply = provider
            .generate(&[Message::system("sys"), Message::user("hi")])
            .await
            .unwrap();
        assert_eq!(reply, "hello");

        let reply = provider.generate(&[Message::user("other")]).await.unwrap();
        assert_eq!(reply, "default");
        assert_eq!(provider.calls(), 2);
    }

    #[test]
    fn test_identity_tracks_configuration() {
        let a = MockProvider::new("one");
        let b = MockProvider::new("one");
        let c = MockProvider::new("two");
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a.identity(), c.identity());
        assert_ne!(
            a.identity(),
            MockProvider::new("one").with_response("x", "y").identity()
        );
    }

    #[tokio::test]
    async fn test_failing_provider_recovers() {
        let provider = FailingProvider::new(2, "ok");
        assert!(provider.generate(&[]).await.is_err());
        assert!(provider.generate(&[]).await.is_err());
        assert_eq!(provider.generate(&[]).await.unwrap(), "ok");
        assert_eq!(provider.calls(), 3);
    }
}
