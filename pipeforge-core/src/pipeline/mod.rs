//! Demand-driven stage pipeline.
//!
//! A pipeline is a set of stages, each reading some columns of a [`Table`]
//! and writing others. Asking for a stage (or a column) runs only the
//! stages needed to produce what is missing, in dependency order.
//!
//! ## Architecture
//!
//! ```text
//! Pipeline::run_stage(target)
//!     └─ resolver: missing columns -> producing stages (depth first, cycle checked)
//!         └─ StageExt::process: filter -> Stage::compute on selected rows -> scatter back
//!             ├─ FunctionalStage: row function, per-row cache
//!             ├─ GenerativeStage: bounded concurrent provider calls, retry, per-row cache
//!             └─ CompositeStage: nested Pipeline::run
//! ```
//!
//! ## Example
//!
//! ```rust
//! use pipeforge_core::prelude::*;
//! use serde_json::{json, Value};
//!
//! # async fn example() -> pipeforge_core::Result<()> {
//! let double = FunctionalStage::new(
//!     StageSpec::new("double").inputs(["value"]).outputs(["doubled"]),
//!     "double-v1",
//!     |row: &[Value]| row[0].as_i64().unwrap_or(0) * 2,
//! )?;
//! let pipeline = Pipeline::builder().add_stage(double).build()?;
//!
//! let table = Table::from_columns([("value", vec![json!(1), json!(2)])])?;
//! let result = pipeline.run(table, &RunContext::new()).await?;
//! assert_eq!(result.column("doubled").unwrap(), &[json!(2), json!(4)]);
//! # Ok(())
//! # }
//! ```
//!
//! [`Table`]: crate::core::Table

pub mod builder;
pub mod composite;
pub mod context;
pub mod functional;
pub mod generative;
pub mod registry;
pub mod resolver;
pub mod stage;

pub use builder::{Pipeline, PipelineBuilder};
pub use composite::CompositeStage;
pub use context::RunContext;
pub use functional::{FunctionalStage, RowOutput};
pub use generative::GenerativeStage;
pub use registry::ProducerIndex;
pub use stage::{Stage, StageExt, StageSpec};
