//! Memoization and provider interaction of generative and functional
//! stages across repeated runs.

mod common;

use common::{init_tracing, int_table};
use pipeforge_core::prelude::*;
use serde_json::json;
use std::sync::Arc;

fn summarize() -> GenerativeStage {
    GenerativeStage::new(
        StageSpec::new("summarize").inputs(["text"]).outputs(["summary"]),
        vec![
            Message::system("You write one-line summaries."),
            Message::user("{text}"),
        ],
    )
    .unwrap()
}

fn texts(values: &[&str]) -> Table {
    Table::from_columns([("text", values.iter().map(|v| json!(v)).collect::<Vec<_>>())])
        .unwrap()
}

#[tokio::test]
async fn test_repeated_rows_and_runs_hit_cache() {
    init_tracing();
    let provider = Arc::new(
        MockProvider::new("generic")
            .with_response("rust is fast", "speed")
            .with_response("tables have rows", "structure"),
    );
    let cache = Arc::new(InMemoryCache::new());
    let ctx = RunContext::new()
        .with_provider(provider.clone())
        .with_cache(cache.clone());
    let pipeline = Pipeline::builder().add_stage(summarize()).build().unwrap();
    let table = texts(&["rust is fast", "tables have rows", "rust is fast"]);

    let first = pipeline.run(table.clone(), &ctx).await.unwrap();
    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses, stats.size), (1, 2, 2));
    assert_eq!(
        first.column("summary").unwrap(),
        &[json!("speed"), json!("structure"), json!("speed")]
    );

    let second = pipeline.run(table, &ctx).await.unwrap();
    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses), (4, 2));
    assert_eq!(provider.calls(), 2);
    assert_eq!(
        serde_json::to_string(first.column("summary").unwrap()).unwrap(),
        serde_json::to_string(second.column("summary").unwrap()).unwrap()
    );
}

#[tokio::test]
async fn test_provider_identity_change_invalidates() {
    let cache = Arc::new(InMemoryCache::new());
    let pipeline = Pipeline::builder().add_stage(summarize()).build().unwrap();
    let table = texts(&["same input"]);

    let ctx = RunContext::new()
        .with_provider(Arc::new(MockProvider::new("first")))
        .with_cache(cache.clone());
    pipeline.run(table.clone(), &ctx).await.unwrap();
    assert_eq!(cache.stats().misses, 1);

    // same configuration, new instance: still a hit
    let ctx = RunContext::new()
        .with_provider(Arc::new(MockProvider::new("first")))
        .with_cache(cache.clone());
    pipeline.run(table.clone(), &ctx).await.unwrap();
    assert_eq!(cache.stats().hits, 1);

    let ctx = RunContext::new()
        .with_provider(Arc::new(MockProvider::new("second")))
        .with_cache(cache.clone());
    let result = pipeline.run(table, &ctx).await.unwrap();
    assert_eq!(cache.stats().misses, 2);
    assert_eq!(result.column("summary").unwrap(), &[json!("second")]);
}

#[tokio::test]
async fn test_logic_id_change_invalidates() {
    let cache = Arc::new(InMemoryCache::new());
    let ctx = RunContext::new().with_cache(cache.clone());
    let table = int_table("value", &[3]);
    let stage = |logic_id: &str, factor: i64| {
        FunctionalStage::new(
            StageSpec::new("scale").inputs(["value"]).outputs(["scaled"]),
            logic_id,
            move |row: &[Value]| row[0].as_i64().unwrap_or_default() * factor,
        )
        .unwrap()
    };
    let empty = Pipeline::new(Vec::new()).unwrap();

    empty.run_stage(&stage("scale-v1", 2), table.clone(), &ctx).await.unwrap();
    empty.run_stage(&stage("scale-v1", 2), table.clone(), &ctx).await.unwrap();
    assert_eq!((cache.stats().hits, cache.stats().misses), (1, 1));

    let result = empty
        .run_stage(&stage("scale-v2", 3), table, &ctx)
        .await
        .unwrap();
    assert_eq!((cache.stats().hits, cache.stats().misses), (1, 2));
    assert_eq!(result.column("scaled").unwrap(), &[json!(9)]);
}

#[tokio::test]
async fn test_filtered_rows_never_reach_provider() {
    let provider = Arc::new(MockProvider::new("generated"));
    let stage = GenerativeStage::new(
        StageSpec::new("maybe")
            .inputs(["text"])
            .outputs(["summary"])
            .filter("wanted", json!("skipped")),
        vec![Message::user("{text}")],
    )
    .unwrap();
    let table = Table::from_columns([
        ("text", vec![json!("a"), json!("b"), json!("c"), json!("d")]),
        (
            "wanted",
            vec![json!(false), json!(true), json!(false), json!(false)],
        ),
    ])
    .unwrap();

    let ctx = RunContext::new().with_provider(provider.clone());
    let result = Pipeline::new(Vec::new())
        .unwrap()
        .run_stage(&stage, table, &ctx)
        .await
        .unwrap();
    assert_eq!(provider.calls(), 1);
    assert_eq!(
        result.column("summary").unwrap(),
        &[
            json!("skipped"),
            json!("generated"),
            json!("skipped"),
            json!("skipped")
        ]
    );
}

#[tokio::test]
async fn test_generative_downstream_of_functional() {
    let provider = Arc::new(MockProvider::new("?").with_response("Describe 4", "four"));
    let pipeline = Pipeline::builder()
        .add_stage(
            GenerativeStage::new(
                StageSpec::new("describe").inputs(["doubled"]).outputs(["description"]),
                vec![Message::user("Describe {doubled}")],
            )
            .unwrap(),
        )
        .add_stage(common::int_stage("double", "value", "doubled", "double-v1", |v| v * 2))
        .build()
        .unwrap();

    let ctx = RunContext::new().with_provider(provider);
    let result = pipeline.run(int_table("value", &[2, 3]), &ctx).await.unwrap();
    assert_eq!(
        result.column("description").unwrap(),
        &[json!("four"), json!("?")]
    );
}

#[tokio::test]
async fn test_clear_caches_empties_private_caches() {
    let private = Arc::new(InMemoryCache::new());
    let pipeline = Pipeline::builder()
        .add_stage(summarize().with_private_cache(private.clone()))
        .build()
        .unwrap();
    let provider = Arc::new(MockProvider::new("x"));
    let ctx = RunContext::new().with_provider(provider.clone());

    pipeline.run(texts(&["a", "b"]), &ctx).await.unwrap();
    pipeline.run(texts(&["a", "b"]), &ctx).await.unwrap();
    assert_eq!(provider.calls(), 2);

    pipeline.clear_caches();
    assert!(private.is_empty());
    // counters survive a clear
    assert_eq!(private.stats().hits, 2);

    pipeline.run(texts(&["a", "b"]), &ctx).await.unwrap();
    assert_eq!(provider.calls(), 4);
}

#[tokio::test]
async fn test_bounded_lru_cache_from_config() {
    let config = ExecutionConfig {
        cache: CacheConfig::lru(1),
        ..Default::default()
    };
    let cache = config.cache.build().unwrap();
    let provider = Arc::new(MockProvider::new("x"));
    let ctx = RunContext::new()
        .with_provider(provider.clone())
        .with_cache(cache.clone())
        .with_config(config);
    let pipeline = Pipeline::builder().add_stage(summarize()).build().unwrap();

    pipeline.run(texts(&["a", "b"]), &ctx).await.unwrap();
    assert_eq!(cache.stats().size, 1);

    // "a" was evicted by "b"
    pipeline.run(texts(&["a"]), &ctx).await.unwrap();
    assert_eq!(provider.calls(), 3);
}
