//! Output-column index for dependency resolution.

use std::{collections::HashMap, sync::Arc};

use crate::{
    config_error,
    core::{PipelineError, Result},
    pipeline::stage::{Stage, StageExt},
};

/// Maps every output column to the position of the stage producing it.
///
/// Built once from the stage list. A column claimed by two stages and two
/// stages sharing a name are both rejected here, so lookups never have to
/// pick between candidates.
#[derive(Debug, Clone, Default)]
pub struct ProducerIndex {
    producers: HashMap<String, usize>,
    names: HashMap<String, usize>,
}

impl ProducerIndex {
    /// Index `stages`, failing on the first contested column or name.
    pub fn build(stages: &[Arc<dyn Stage>]) -> Result<Self> {
        let mut index = Self::default();
        for (position, stage) in stages.iter().enumerate() {
            stage.spec().validate()?;

            if let Some(&existing) = index.names.get(stage.name()) {
                return Err(config_error!(
                    "stage name '{}' is registered twice (positions {} and {})",
                    stage.name(),
                    existing,
                    position
                ));
            }
            index.names.insert(stage.name().to_string(), position);

            for column in &stage.spec().output_columns {
                if let Some(&first) = index.producers.get(column) {
                    return Err(PipelineError::DuplicateProducer {
                        column: column.clone(),
                        first: stages[first].name().to_string(),
                        second: stage.name().to_string(),
                    });
                }
                index.producers.insert(column.clone(), position);
            }
        }
        Ok(index)
    }

    /// Position of the stage producing `column`.
    pub fn producer(&self, column: &str) -> Option<usize> {
        self.producers.get(column).copied()
    }

    /// Position of the stage called `name`.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    /// Number of indexed output columns.
    pub fn column_count(&self) -> usize {
        self.producers.len()
    }
}
