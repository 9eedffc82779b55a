//! Pipeline construction.
//!
//! A [`Pipeline`] is an ordered list of stages plus the output-column index
//! derived from it. All structural checks (spec validity, unique names,
//! single producer per column) run here, so a pipeline that exists is one
//! the resolver can reason about.

use std::sync::Arc;

use crate::{
    core::Result,
    pipeline::{
        registry::ProducerIndex,
        stage::{Stage, StageExt},
    },
};

/// Stages in caller-declared order with their producer index.
#[derive(Clone)]
pub struct Pipeline {
    pub(crate) stages: Vec<Arc<dyn Stage>>,
    pub(crate) producers: ProducerIndex,
}

impl Pipeline {
    /// Build a pipeline from stages in declared order.
    pub fn new(stages: Vec<Arc<dyn Stage>>) -> Result<Self> {
        let producers = ProducerIndex::build(&stages)?;
        tracing::debug!(
            stages = stages.len(),
            columns = producers.column_count(),
            "Built pipeline"
        );
        Ok(Self { stages, producers })
    }

    /// Start a builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Stages in declared order.
    pub fn stages(&self) -> &[Arc<dyn Stage>] {
        &self.stages
    }

    /// Stage called `name`.
    pub fn stage(&self, name: &str) -> Option<&Arc<dyn Stage>> {
        self.producers
            .position_of(name)
            .map(|position| &self.stages[position])
    }

    /// Stage producing `column`, if any.
    pub fn producer_of(&self, column: &str) -> Option<&Arc<dyn Stage>> {
        self.producers
            .producer(column)
            .map(|position| &self.stages[position])
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the pipeline has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Clear every stage-owned cache. Stages without one ignore the call.
    pub fn clear_caches(&self) {
        for stage in &self.stages {
            stage.clear_cache();
        }
        tracing::debug!(stages = self.stages.len(), "Cleared stage caches");
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field(
                "stages",
                &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Incremental pipeline construction.
///
/// ```rust
/// use pipeforge_core::pipeline::{FunctionalStage, Pipeline, StageSpec};
/// use serde_json::{json, Value};
///
/// let double = FunctionalStage::new(
///     StageSpec::new("double").inputs(["value"]).outputs(["doubled"]),
///     "double-v1",
///     |row: &[Value]| json!(row[0].as_i64().unwrap_or(0) * 2),
/// )
/// .unwrap();
///
/// let pipeline = Pipeline::builder().add_stage(double).build().unwrap();
/// assert_eq!(pipeline.len(), 1);
/// ```
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<Arc<dyn Stage>>,
}

impl PipelineBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an owned stage.
    pub fn add_stage<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Append a stage shared with other pipelines.
    pub fn add_shared(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<Pipeline> {
        Pipeline::new(self.stages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::PipelineError,
        pipeline::{functional::FunctionalStage, stage::StageSpec},
    };
    use serde_json::Value;

    fn identity(name: &str, input: &str, output: &str) -> FunctionalStage {
        FunctionalStage::new(
            StageSpec::new(name).inputs([input]).outputs([output]),
            "identity",
            |row: &[Value]| row[0].clone(),
        )
        .unwrap()
    }

    #[test]
    fn test_build_and_lookup() {
        let pipeline = Pipeline::builder()
            .add_stage(identity("a", "x", "y"))
            .add_shared(Arc::new(identity("b", "y", "z")))
            .build()
            .unwrap();

        assert_eq!(pipeline.len(), 2);
        assert_eq!(pipeline.producer_of("z").unwrap().name(), "b");
        assert!(pipeline.producer_of("x").is_none());
        assert_eq!(pipeline.stage("a").unwrap().name(), "a");
        assert_eq!(format!("{pipeline:?}"), r#"Pipeline { stages: ["a", "b"] }"#);
    }

    #[test]
    fn test_duplicate_producer_is_construction_error() {
        let err = Pipeline::builder()
            .add_stage(identity("a", "x", "y"))
            .add_stage(identity("b", "x", "y"))
            .build()
            .unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateProducer { .. }));
    }

    #[test]
    fn test_empty_pipeline() {
        let pipeline = Pipeline::new(Vec::new()).unwrap();
        assert!(pipeline.is_empty());
        pipeline.clear_caches();
    }
}
