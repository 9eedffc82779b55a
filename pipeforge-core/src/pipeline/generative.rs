//! Stages whose output comes from a generation provider.
//!
//! Each row renders the conversation template with its input values and
//! becomes one provider call. Calls run concurrently, bounded by
//! `max_concurrent_generations`, and every call goes through the run's
//! [`RetryPolicy`](crate::async_processing::RetryPolicy). Results are
//! written back by row position, so completion order never affects the
//! output.
//!
//! Cache lookups and writes happen per row around its own call. Two
//! identical rows in flight at the same time may both reach the provider;
//! both write the same entry.

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};

use crate::{
    caching::{Cache, CacheLookup, FingerprintBuilder},
    config_error,
    core::{Message, PipelineError, Provider, Result, Table, Value},
    pipeline::{
        context::RunContext,
        stage::{Stage, StageSpec},
    },
};

/// A single-output stage that asks a provider to fill its column.
pub struct GenerativeStage {
    spec: StageSpec,
    template: Vec<Message>,
    private_cache: Option<Arc<dyn Cache>>,
}

impl GenerativeStage {
    /// Create a stage rendering `template` for each row.
    ///
    /// `{column}` placeholders in message content are replaced by the row's
    /// value for that input column: strings verbatim, anything else as JSON.
    pub fn new(spec: StageSpec, template: Vec<Message>) -> Result<Self> {
        spec.validate()?;
        if spec.output_columns.len() != 1 {
            return Err(config_error!(
                "generative stage '{}' must declare exactly one output column, got {}",
                spec.name,
                spec.output_columns.len()
            ));
        }
        if template.is_empty() {
            return Err(config_error!(
                "generative stage '{}' needs at least one template message",
                spec.name
            ));
        }
        Ok(Self {
            spec,
            template,
            private_cache: None,
        })
    }

    /// Use `cache` whenever a run supplies no cache of its own.
    pub fn with_private_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.private_cache = Some(cache);
        self
    }

    /// The conversation template.
    pub fn template(&self) -> &[Message] {
        &self.template
    }

    /// Conversation for one row.
    pub fn render(&self, values: &[Value]) -> Vec<Message> {
        self.template
            .iter()
            .map(|message| {
                let content = self.spec.input_columns.iter().zip(values).fold(
                    message.content.clone(),
                    |content, (column, value)| {
                        content.replace(&format!("{{{column}}}"), &placeholder_text(value))
                    },
                );
                Message::new(message.role, content)
            })
            .collect()
    }

    fn cache_key(&self, values: &[Value], provider_identity: &str) -> Result<String> {
        FingerprintBuilder::new("generative")
            .component("template", &self.template)?
            .component("values", values)?
            .component("provider", provider_identity)?
            .finish()
    }
}

fn placeholder_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Stage for GenerativeStage {
    fn spec(&self) -> &StageSpec {
        &self.spec
    }

    async fn compute(&self, mut table: Table, ctx: &RunContext) -> Result<Table> {
        let provider = ctx
            .provider()
            .ok_or_else(|| PipelineError::ProviderMissing {
                stage: self.spec.name.clone(),
            })?;
        if ctx.is_cancelled() {
            return Err(PipelineError::Cancelled {
                stage: self.spec.name.clone(),
            });
        }

        let cache = ctx.cache().or(self.private_cache.as_ref());
        let identity = provider.identity();
        let limiter = ctx.concurrency_limiter();
        let retry = ctx.retry_policy();
        let retry = &retry;
        let cancel = ctx.cancellation_token();
        let stage = self.spec.name.as_str();
        let identity = identity.as_str();

        let rows: Vec<Vec<Value>> = table
            .rows()
            .map(|row| row.values(&self.spec.input_columns))
            .collect();
        let num_rows = rows.len();
        let started = Instant::now();

        let results: Vec<(usize, Value, bool)> = stream::iter(rows.into_iter().enumerate())
            .map(|(position, values)| async move {
                let key = match cache {
                    Some(cache) => {
                        let key = self.cache_key(&values, identity)?;
                        if let CacheLookup::Hit(output) = cache.get(&key) {
                            let [value]: [Value; 1] =
                                output.try_into().map_err(|output: Vec<Value>| {
                                    PipelineError::CacheConsistency {
                                        stage: stage.to_string(),
                                        expected: 1,
                                        found: output.len(),
                                    }
                                })?;
                            return Ok((position, value, true));
                        }
                        Some(key)
                    }
                    None => None,
                };

                let messages = self.render(&values);
                let _permit = limiter.acquire().await?;
                let text = retry
                    .run(stage, cancel, || provider.generate(&messages))
                    .await?;
                let value = Value::String(text);

                if let (Some(cache), Some(key)) = (cache, key) {
                    cache.set(key, vec![value.clone()]);
                }
                Ok::<_, PipelineError>((position, value, false))
            })
            .buffer_unordered(limiter.max_concurrent())
            .try_collect()
            .await?;

        let mut output = vec![Value::Null; num_rows];
        let mut hits = 0usize;
        for (position, value, hit) in results {
            hits += usize::from(hit);
            output[position] = value;
        }
        table.set_column(self.spec.output_columns[0].clone(), output)?;

        tracing::debug!(
            stage = %stage,
            rows = num_rows,
            cache_hits = hits,
            provider_calls = num_rows - hits,
            duration_ms = started.elapsed().as_millis() as u64,
            "Generation finished"
        );
        Ok(table)
    }

    fn clear_cache(&self) {
        if let Some(cache) = &self.private_cache {
            cache.clear();
        }
    }
}

impl std::fmt::Debug for GenerativeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerativeStage")
            .field("spec", &self.spec)
            .field("template", &self.template)
            .field("private_cache", &self.private_cache.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        caching::InMemoryCache,
        config::ExecutionConfig,
        core::{FailingProvider, MockProvider, Provider},
        pipeline::stage::StageExt,
    };
    use serde_json::json;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };
    use tokio_util::sync::CancellationToken;

    fn summarize() -> GenerativeStage {
        GenerativeStage::new(
            StageSpec::new("summarize").inputs(["text"]).outputs(["summary"]),
            vec![
                Message::system("You summarize text."),
                Message::user("Summarize: {text}"),
            ],
        )
        .unwrap()
    }

    fn texts(values: &[&str]) -> Table {
        Table::from_columns([(
            "text",
            values.iter().map(|v| json!(v)).collect::<Vec<_>>(),
        )])
        .unwrap()
    }

    #[test]
    fn test_requires_single_output() {
        let err = GenerativeStage::new(
            StageSpec::new("g").inputs(["a"]).outputs(["x", "y"]),
            vec![Message::user("{a}")],
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let stage = GenerativeStage::new(
            StageSpec::new("g").inputs(["name", "count", "missing"]).outputs(["out"]),
            vec![Message::user("{name} has {count} items, {missing}, {other}")],
        )
        .unwrap();
        let messages = stage.render(&[json!("Ada"), json!(3), Value::Null]);
        assert_eq!(messages[0].content, "Ada has 3 items, null, {other}");
    }

    #[tokio::test]
    async fn test_generates_in_row_order() {
        let provider = Arc::new(
            MockProvider::new("?")
                .with_response("Summarize: one", "1")
                .with_response("Summarize: two", "2")
                .with_response("Summarize: three", "3"),
        );
        let ctx = RunContext::new().with_provider(provider.clone());
        let result = summarize()
            .process(texts(&["one", "two", "three"]), &ctx)
            .await
            .unwrap();
        assert_eq!(
            result.column("summary").unwrap(),
            &[json!("1"), json!("2"), json!("3")]
        );
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_missing_provider() {
        let err = summarize()
            .process(texts(&["a"]), &RunContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ProviderMissing { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_rows_hit_cache() {
        let provider = Arc::new(MockProvider::new("summary"));
        let cache = Arc::new(InMemoryCache::new());
        let ctx = RunContext::new()
            .with_provider(provider.clone())
            .with_cache(cache.clone());

        let first = summarize()
            .process(texts(&["same", "other", "same"]), &ctx)
            .await
            .unwrap();
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 2));
        assert_eq!(provider.calls(), 2);

        let second = summarize()
            .process(texts(&["same", "other", "same"]), &ctx)
            .await
            .unwrap();
        assert_eq!(cache.stats().hits, 4);
        assert_eq!(provider.calls(), 2);
        assert_eq!(first.column("summary"), second.column("summary"));
    }

    #[tokio::test]
    async fn test_retry_recovers_transient_failures() {
        let provider = Arc::new(FailingProvider::new(2, "ok"));
        let mut config = ExecutionConfig::default();
        config.retry.initial_backoff_ms = 1;
        config.retry.max_backoff_ms = 1;
        let ctx = RunContext::new()
            .with_provider(provider.clone())
            .with_config(config);

        let result = summarize().process(texts(&["a"]), &ctx).await.unwrap();
        assert_eq!(result.column("summary").unwrap(), &[json!("ok")]);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_abort_stage() {
        let mut config = ExecutionConfig::default();
        config.retry.max_attempts = 2;
        config.retry.initial_backoff_ms = 1;
        config.retry.max_backoff_ms = 1;
        let ctx = RunContext::new()
            .with_provider(Arc::new(FailingProvider::always()))
            .with_config(config);

        let err = summarize().process(texts(&["a", "b"]), &ctx).await.unwrap_err();
        assert!(matches!(err, PipelineError::Provider { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = RunContext::new()
            .with_provider(Arc::new(MockProvider::new("x")))
            .with_cancellation(token);
        let err = summarize().process(texts(&["a"]), &ctx).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { .. }));
    }

    /// Tracks the highest number of calls in flight at once.
    struct PeakProvider {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Provider for PeakProvider {
        async fn generate(&self, _messages: &[Message]) -> Result<String> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok("done".to_string())
        }

        fn identity(&self) -> String {
            "peak".to_string()
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let provider = Arc::new(PeakProvider {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let ctx = RunContext::new()
            .with_provider(provider.clone())
            .with_config(ExecutionConfig {
                max_concurrent_generations: 2,
                ..Default::default()
            });
        let values: Vec<String> = (0..8).map(|i| format!("row {i}")).collect();
        let refs: Vec<&str> = values.iter().map(String::as_str).collect();

        summarize().process(texts(&refs), &ctx).await.unwrap();
        let peak = provider.peak.load(Ordering::SeqCst);
        assert!(peak <= 2, "peak concurrency was {peak}");
        assert!(peak >= 1);
    }

    #[tokio::test]
    async fn test_provider_identity_changes_key() {
        let stage = summarize();
        let row = [json!("x")];
        let a = MockProvider::new("a").identity();
        let b = MockProvider::new("b").identity();
        assert_ne!(
            stage.cache_key(&row, &a).unwrap(),
            stage.cache_key(&row, &b).unwrap()
        );
        assert_eq!(
            stage.cache_key(&row, &a).unwrap(),
            stage.cache_key(&row, &a).unwrap()
        );
    }
}
