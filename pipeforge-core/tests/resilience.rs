//! Retry, cancellation and configuration loading around provider calls.

use pipeforge_core::{core::FailingProvider, prelude::*};
use serde_json::json;
use std::{io::Write, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

fn echo() -> GenerativeStage {
    GenerativeStage::new(
        StageSpec::new("echo").inputs(["text"]).outputs(["reply"]),
        vec![Message::user("{text}")],
    )
    .unwrap()
}

fn one_row() -> Table {
    Table::from_columns([("text", vec![json!("hello")])]).unwrap()
}

fn fast_retry(max_attempts: u32) -> ExecutionConfig {
    let mut config = ExecutionConfig::default();
    config.retry.max_attempts = max_attempts;
    config.retry.initial_backoff_ms = 1;
    config.retry.max_backoff_ms = 5;
    config
}

#[tokio::test]
async fn test_transient_failures_are_retried_and_cached() {
    let provider = Arc::new(FailingProvider::new(2, "finally"));
    let cache = Arc::new(InMemoryCache::new());
    let ctx = RunContext::new()
        .with_provider(provider.clone())
        .with_cache(cache.clone())
        .with_config(fast_retry(3));
    let pipeline = Pipeline::builder().add_stage(echo()).build().unwrap();

    let result = pipeline.run(one_row(), &ctx).await.unwrap();
    assert_eq!(result.column("reply").unwrap(), &[json!("finally")]);
    assert_eq!(provider.calls(), 3);
    assert_eq!(cache.stats().size, 1);
}

#[tokio::test]
async fn test_exhausted_retries_surface_provider_error() {
    let provider = Arc::new(FailingProvider::always());
    let cache = Arc::new(InMemoryCache::new());
    let ctx = RunContext::new()
        .with_provider(provider.clone())
        .with_cache(cache.clone())
        .with_config(fast_retry(4));
    let pipeline = Pipeline::builder().add_stage(echo()).build().unwrap();

    let err = pipeline.run(one_row(), &ctx).await.unwrap_err();
    assert!(matches!(err, PipelineError::Provider { attempts: 4, .. }));
    assert_eq!(provider.calls(), 4);
    assert_eq!(cache.stats().size, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_interrupts_slow_provider() {
    let provider = Arc::new(MockProvider::new("late").with_latency(Duration::from_secs(60)));
    let token = CancellationToken::new();
    let ctx = RunContext::new()
        .with_provider(provider)
        .with_cancellation(token.clone());
    let pipeline = Pipeline::builder().add_stage(echo()).build().unwrap();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let err = pipeline.run(one_row(), &ctx).await.unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled { stage } if stage == "echo"));
    canceller.await.unwrap();
}

#[tokio::test]
async fn test_non_provider_errors_are_not_retried() {
    let ctx = RunContext::new().with_config(fast_retry(5));
    let err = Pipeline::builder()
        .add_stage(echo())
        .build()
        .unwrap()
        .run(one_row(), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::ProviderMissing { .. }));
    assert!(!err.is_retryable());
}

#[cfg(feature = "toml-support")]
#[tokio::test]
async fn test_config_file_drives_run() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
max_concurrent_generations = 1

[retry]
max_attempts = 2
initial_backoff_ms = 1
max_backoff_ms = 1

[cache]
eviction = "lru"
max_entries = 16
"#
    )
    .unwrap();

    let config = ExecutionConfig::from_file(file.path()).unwrap();
    assert_eq!(config.max_concurrent_generations, 1);
    let cache = config.cache.build().unwrap();
    let provider = Arc::new(FailingProvider::new(1, "ok"));
    let ctx = RunContext::new()
        .with_provider(provider.clone())
        .with_cache(cache.clone())
        .with_config(config);

    let result = Pipeline::builder()
        .add_stage(echo())
        .build()
        .unwrap()
        .run(one_row(), &ctx)
        .await
        .unwrap();
    assert_eq!(result.column("reply").unwrap(), &[json!("ok")]);
    assert_eq!(provider.calls(), 2);
    assert_eq!(cache.stats().size, 1);
}

#[test]
fn test_invalid_config_file_is_rejected() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(file, r#"{{"max_concurrent_generations": 0}}"#).unwrap();
    let err = ExecutionConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, PipelineError::Config { .. }));
}
