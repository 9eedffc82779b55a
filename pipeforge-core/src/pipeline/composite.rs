//! Stages that run a nested pipeline.

use async_trait::async_trait;

use crate::{
    config_error,
    core::{PipelineError, Result, Table},
    pipeline::{
        builder::Pipeline,
        context::RunContext,
        stage::{Stage, StageSpec},
    },
};

/// A stage whose computation is a whole nested [`Pipeline`].
///
/// The nested pipeline sees only the outer stage's input columns, and only
/// the declared output columns come back out. Intermediate columns stay
/// inside. Filtering follows the usual stage template: filtered-out rows
/// never reach the nested pipeline and keep the fallback value.
pub struct CompositeStage {
    spec: StageSpec,
    pipeline: Pipeline,
}

impl CompositeStage {
    /// Wrap `pipeline` behind `spec`.
    ///
    /// Every declared output must have a producer in `pipeline`.
    pub fn new(spec: StageSpec, pipeline: Pipeline) -> Result<Self> {
        spec.validate()?;
        if let Some(orphan) = spec
            .output_columns
            .iter()
            .find(|c| pipeline.producer_of(c).is_none())
        {
            return Err(config_error!(
                "composite stage '{}' declares output '{}' that its pipeline never produces",
                spec.name,
                orphan
            ));
        }
        Ok(Self { spec, pipeline })
    }

    /// The nested pipeline.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

#[async_trait]
impl Stage for CompositeStage {
    fn spec(&self) -> &StageSpec {
        &self.spec
    }

    async fn compute(&self, mut table: Table, ctx: &RunContext) -> Result<Table> {
        let inner = table.project(&self.spec.input_columns);
        tracing::debug!(
            stage = %self.spec.name,
            nested_stages = self.pipeline.len(),
            rows = inner.num_rows(),
            "Running nested pipeline"
        );
        let produced = self.pipeline.run(inner, ctx).await?;

        if let Some(missing) = self
            .spec
            .output_columns
            .iter()
            .find(|c| !produced.has_column(c))
        {
            return Err(PipelineError::MissingColumn {
                stage: self.spec.name.clone(),
                column: missing.clone(),
            });
        }
        table.assign_by_index(&produced, &self.spec.output_columns)?;
        Ok(table)
    }

    fn clear_cache(&self) {
        self.pipeline.clear_caches();
    }
}

impl std::fmt::Debug for CompositeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeStage")
            .field("spec", &self.spec)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}
