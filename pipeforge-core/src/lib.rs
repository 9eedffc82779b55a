//! # PipeForge Core
//!
//! Execution engine for demand-driven tabular stage pipelines.
//!
//! This crate provides:
//! - A column-oriented [`Table`] with stable row labels
//! - Stages that read columns and write new ones, with optional boolean
//!   row filters and fallback values
//! - Dependency resolution that runs only the stages a request needs and
//!   reports cycles and unresolvable columns
//! - Row-level memoization keyed by content fingerprints
//! - Generative stages with bounded concurrency, retry and cancellation
//! - Composite stages that nest whole pipelines
//!
//! ## Feature Flags
//!
//! - `toml-support` (default): load [`ExecutionConfig`] from TOML files
//!
//! ## Quick Start
//!
//! ```rust
//! use pipeforge_core::prelude::*;
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//!
//! # async fn example() -> pipeforge_core::Result<()> {
//! let summarize = GenerativeStage::new(
//!     StageSpec::new("summarize").inputs(["text"]).outputs(["summary"]),
//!     vec![Message::user("Summarize: {text}")],
//! )?;
//! let pipeline = Pipeline::builder().add_stage(summarize).build()?;
//!
//! let ctx = RunContext::new()
//!     .with_provider(Arc::new(MockProvider::new("short")))
//!     .with_cache(Arc::new(InMemoryCache::new()));
//! let table = Table::from_columns([("text", vec![json!("a long text")])])?;
//! let result = pipeline.run(table, &ctx).await?;
//! assert_eq!(result.column("summary").unwrap(), &[json!("short")]);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Concurrency limiting and retry for provider calls
pub mod async_processing;
/// Row-level memoization
pub mod caching;
/// Execution configuration and loading
pub mod config;
/// Core types: errors, table, provider traits
pub mod core;
/// Stages, pipelines and dependency resolution
pub mod pipeline;

/// Prelude for common imports
pub mod prelude {
    pub use crate::caching::{Cache, CacheConfig, CacheLookup, CacheStats, InMemoryCache};
    pub use crate::config::ExecutionConfig;
    pub use crate::core::{
        Message, MockProvider, PipelineError, Provider, Result, Role, RowId, Table, Value,
    };
    pub use crate::pipeline::{
        CompositeStage, FunctionalStage, GenerativeStage, Pipeline, PipelineBuilder, RunContext,
        Stage, StageExt, StageSpec,
    };
}

// Re-export core types
pub use crate::caching::{Cache, CacheLookup, CacheStats, InMemoryCache};
pub use crate::config::ExecutionConfig;
pub use crate::core::{
    ErrorContext, Message, PipelineError, Provider, Result, Role, RowId, Table, Value,
};
pub use crate::pipeline::{
    CompositeStage, FunctionalStage, GenerativeStage, Pipeline, PipelineBuilder, RunContext,
    Stage, StageExt, StageSpec,
};
