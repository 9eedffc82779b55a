//! Stage trait and the shared filtering template.
//!
//! A stage declares the columns it reads, the columns it writes and an
//! optional boolean filter column. Concrete stages only implement
//! [`Stage::compute`]; the filtering, fallback filling and output checks
//! live once in [`StageExt::process`].

use std::{collections::HashSet, time::Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::{
    config_error,
    core::{PipelineError, Result, Table, Value},
    pipeline::context::RunContext,
};

/// Declared shape of a stage. Immutable once the stage is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    /// Unique name within a pipeline, used in logs and errors
    pub name: String,
    /// Columns read by the stage, in argument order
    pub input_columns: Vec<String>,
    /// Columns written by the stage, in result order
    pub output_columns: Vec<String>,
    /// Boolean column gating which rows are computed
    pub filter_column: Option<String>,
    /// Value written to every output of a filtered-out row
    pub filter_fallback: Value,
}

impl StageSpec {
    /// Start a spec with no columns.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_columns: Vec::new(),
            output_columns: Vec::new(),
            filter_column: None,
            filter_fallback: Value::Null,
        }
    }

    /// Set the input columns.
    pub fn inputs<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the output columns.
    pub fn outputs<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Gate the stage on a boolean column; filtered-out rows get `fallback`.
    pub fn filter(mut self, column: impl Into<String>, fallback: Value) -> Self {
        self.filter_column = Some(column.into());
        self.filter_fallback = fallback;
        self
    }

    /// Columns that must exist before the stage runs: inputs, then the
    /// filter column.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.input_columns
            .iter()
            .chain(self.filter_column.iter())
            .map(String::as_str)
    }

    /// Reject specs no pipeline could execute.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(config_error!("stage name must not be empty"));
        }
        if self.output_columns.is_empty() {
            return Err(config_error!(
                "stage '{}' must declare at least one output column",
                self.name
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.output_columns.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(config_error!(
                "stage '{}' declares output '{}' twice",
                self.name,
                dup
            ));
        }
        if let Some(own) = self.dependencies().find(|c| seen.contains(c)) {
            return Err(config_error!(
                "stage '{}' both reads and writes column '{}'",
                self.name,
                own
            ));
        }
        Ok(())
    }
}

/// A named unit of computation over a table.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Declared columns and filter settings.
    fn spec(&self) -> &StageSpec;

    /// Stage-specific work on rows that passed the filter.
    ///
    /// Must return a table with the same rows (count and labels) as `table`
    /// and every declared output column present.
    async fn compute(&self, table: Table, ctx: &RunContext) -> Result<Table>;

    /// Drop any cache owned by the stage itself.
    fn clear_cache(&self) {}
}

/// Operations every [`Stage`] gets for free.
#[async_trait]
pub trait StageExt: Stage {
    /// Stage name from its spec.
    fn name(&self) -> &str {
        &self.spec().name
    }

    /// Columns the stage writes.
    fn outputs(&self) -> &[String] {
        &self.spec().output_columns
    }

    /// Run the stage on `table` with filtering applied.
    ///
    /// Without a filter the whole table goes to [`Stage::compute`]. With a
    /// filter, every output starts at the fallback value and only the rows
    /// whose filter value is `true` are computed and scattered back. The
    /// returned table always has the input's rows in the input's order.
    async fn process(&self, table: Table, ctx: &RunContext) -> Result<Table> {
        let spec = self.spec();
        let span = tracing::info_span!("stage", name = %spec.name);
        async move {
            if ctx.is_cancelled() {
                return Err(PipelineError::Cancelled {
                    stage: spec.name.clone(),
                });
            }
            let started = Instant::now();
            let num_rows = table.num_rows();

            let result = match &spec.filter_column {
                None => {
                    let computed = self.compute(table, ctx).await?;
                    check_outputs(spec, &computed, num_rows)?;
                    computed
                }
                Some(filter) => {
                    let positions = selected_rows(spec, filter, &table)?;
                    tracing::debug!(
                        selected = positions.len(),
                        total = num_rows,
                        "Applied filter"
                    );

                    let mut result = table.clone();
                    for column in &spec.output_columns {
                        result.fill_column(column.as_str(), &spec.filter_fallback);
                    }
                    if !positions.is_empty() {
                        let subset = table.select(&positions)?;
                        let computed = self.compute(subset, ctx).await?;
                        check_outputs(spec, &computed, positions.len())?;
                        result.assign_by_index(&computed, &spec.output_columns)?;
                    }
                    result
                }
            };

            tracing::debug!(
                rows = num_rows,
                duration_ms = started.elapsed().as_millis() as u64,
                "Stage completed"
            );
            Ok(result)
        }
        .instrument(span)
        .await
    }
}

impl<S: Stage + ?Sized> StageExt for S {}

/// Positions of rows whose filter value is `true`. Any non-boolean value,
/// null included, is a [`PipelineError::FilterType`].
fn selected_rows(spec: &StageSpec, filter: &str, table: &Table) -> Result<Vec<usize>> {
    let values = table
        .column(filter)
        .ok_or_else(|| PipelineError::MissingColumn {
            stage: spec.name.clone(),
            column: filter.to_string(),
        })?;

    let mut positions = Vec::new();
    for (position, value) in values.iter().enumerate() {
        match value {
            Value::Bool(true) => positions.push(position),
            Value::Bool(false) => {}
            other => {
                return Err(PipelineError::FilterType {
                    stage: spec.name.clone(),
                    column: filter.to_string(),
                    row: table.index()[position],
                    found: other.clone(),
                })
            }
        }
    }
    Ok(positions)
}

fn check_outputs(spec: &StageSpec, table: &Table, expected_rows: usize) -> Result<()> {
    if table.num_rows() != expected_rows {
        return Err(PipelineError::table(format!(
            "stage '{}' returned {} rows, expected {}",
            spec.name,
            table.num_rows(),
            expected_rows
        )));
    }
    if let Some(missing) = spec.output_columns.iter().find(|c| !table.has_column(c)) {
        return Err(PipelineError::MissingColumn {
            stage: spec.name.clone(),
            column: missing.clone(),
        });
    }
    Ok(())
}
