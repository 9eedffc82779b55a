//! Demand-driven dependency resolution.
//!
//! Resolution works on column names only. Starting from the columns a table
//! already has, the planner walks from a target stage to the producers of
//! its missing columns, depth first, and emits stages in the order their
//! outputs become available. Execution then runs that order and re-checks
//! every stage's dependencies against the real table before invoking it.
//!
//! A stage that is re-entered while its own dependencies are still being
//! resolved ends planning with [`PipelineError::CyclicDependency`].

use std::{
    collections::{BTreeSet, HashSet},
    time::Instant,
};

use crate::{
    config_error,
    core::{PipelineError, Result, Table},
    pipeline::{
        builder::Pipeline,
        context::RunContext,
        stage::{Stage, StageExt},
    },
};

/// Label used in errors for column requests that do not come from a stage.
const REQUESTED_COLUMNS: &str = "<requested columns>";

struct Planner<'p> {
    pipeline: &'p Pipeline,
    available: HashSet<String>,
    in_progress: Vec<String>,
    planned: HashSet<usize>,
    order: Vec<usize>,
}

impl<'p> Planner<'p> {
    fn new<'c>(pipeline: &'p Pipeline, columns: impl IntoIterator<Item = &'c str>) -> Self {
        Self {
            pipeline,
            available: columns.into_iter().map(str::to_string).collect(),
            in_progress: Vec::new(),
            planned: HashSet::new(),
            order: Vec::new(),
        }
    }

    /// Plan the producers `stage` needs, not `stage` itself.
    fn plan_dependencies(&mut self, stage: &dyn Stage) -> Result<()> {
        let name = stage.name();
        if let Some(start) = self.in_progress.iter().position(|n| n == name) {
            let mut path = self.in_progress[start..].to_vec();
            path.push(name.to_string());
            return Err(PipelineError::CyclicDependency { path });
        }

        let missing: Vec<&str> = stage
            .spec()
            .dependencies()
            .filter(|c| !self.available.contains(*c))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        self.in_progress.push(name.to_string());
        self.plan_columns(name, &missing)?;
        self.in_progress.pop();
        Ok(())
    }

    /// Plan producers for `columns` on behalf of `requester`.
    fn plan_columns(&mut self, requester: &str, columns: &[&str]) -> Result<()> {
        let unresolved: BTreeSet<&str> = columns
            .iter()
            .copied()
            .filter(|c| !self.available.contains(*c) && self.pipeline.producers.producer(c).is_none())
            .collect();
        if !unresolved.is_empty() {
            return Err(PipelineError::Dependency {
                stage: requester.to_string(),
                columns: unresolved.into_iter().map(str::to_string).collect(),
            });
        }

        for column in columns {
            // an earlier producer in this loop may have supplied it
            if self.available.contains(*column) {
                continue;
            }
            let Some(position) = self.pipeline.producers.producer(column) else {
                continue;
            };
            let producer = self.pipeline.stages[position].clone();
            tracing::debug!(
                column = %column,
                producer = %producer.name(),
                requested_by = %requester,
                "Resolving missing column"
            );
            self.plan_dependencies(producer.as_ref())?;
            self.push(position);
        }
        Ok(())
    }

    fn push(&mut self, position: usize) {
        if self.planned.insert(position) {
            let stage = &self.pipeline.stages[position];
            self.available
                .extend(stage.spec().output_columns.iter().cloned());
            self.order.push(position);
        }
    }
}

impl Pipeline {
    /// Run every stage, in declared order, resolving dependencies as needed.
    ///
    /// Each stage runs at most once: a stage already pulled in as another
    /// stage's dependency is not run again when its own turn comes.
    pub async fn run(&self, table: Table, ctx: &RunContext) -> Result<Table> {
        let mut planner = Planner::new(self, table.column_names());
        for (position, stage) in self.stages.iter().enumerate() {
            if planner.planned.contains(&position) {
                continue;
            }
            planner.plan_dependencies(stage.as_ref())?;
            planner.push(position);
        }

        tracing::info!(
            stages = planner.order.len(),
            rows = table.num_rows(),
            "Running pipeline"
        );
        let started = Instant::now();
        let result = self.execute(&planner.order, table, ctx).await?;
        tracing::info!(
            stages = planner.order.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Pipeline completed"
        );
        Ok(result)
    }

    /// Run `stage` after whatever producers its missing inputs need.
    ///
    /// The target does not have to belong to this pipeline; only its
    /// dependencies are looked up here. The result keeps every column of
    /// `table` and adds the outputs of each stage that ran.
    pub async fn run_stage(&self, stage: &dyn Stage, table: Table, ctx: &RunContext) -> Result<Table> {
        let mut planner = Planner::new(self, table.column_names());
        planner.plan_dependencies(stage)?;

        tracing::info!(
            stage = %stage.name(),
            upstream = planner.order.len(),
            rows = table.num_rows(),
            "Running stage"
        );
        let table = self.execute(&planner.order, table, ctx).await?;
        invoke(stage, table, ctx).await
    }

    /// [`Pipeline::run_stage`] for a stage of this pipeline, by name.
    pub async fn run_stage_named(&self, name: &str, table: Table, ctx: &RunContext) -> Result<Table> {
        let stage = self
            .stage(name)
            .ok_or_else(|| config_error!("pipeline has no stage named '{}'", name))?
            .clone();
        self.run_stage(stage.as_ref(), table, ctx).await
    }

    /// Run just the stages needed to materialize `columns`.
    ///
    /// Columns already in `table` are left as they are.
    pub async fn run_for_columns<S: AsRef<str>>(
        &self,
        columns: &[S],
        table: Table,
        ctx: &RunContext,
    ) -> Result<Table> {
        let requested: Vec<&str> = columns.iter().map(AsRef::as_ref).collect();
        let mut planner = Planner::new(self, table.column_names());
        planner.plan_columns(REQUESTED_COLUMNS, &requested)?;

        tracing::info!(
            columns = ?requested,
            stages = planner.order.len(),
            "Running stages for requested columns"
        );
        self.execute(&planner.order, table, ctx).await
    }

    /// Names of the stages [`Pipeline::run_stage`] would run, in order,
    /// for a table that has `columns`. The target comes last.
    pub fn execution_plan<S: AsRef<str>>(&self, stage: &dyn Stage, columns: &[S]) -> Result<Vec<String>> {
        let mut planner = Planner::new(self, columns.iter().map(AsRef::as_ref));
        planner.plan_dependencies(stage)?;
        Ok(planner
            .order
            .iter()
            .map(|&position| self.stages[position].name().to_string())
            .chain(std::iter::once(stage.name().to_string()))
            .collect())
    }

    async fn execute(&self, order: &[usize], mut table: Table, ctx: &RunContext) -> Result<Table> {
        for &position in order {
            table = invoke(self.stages[position].as_ref(), table, ctx).await?;
        }
        Ok(table)
    }
}

/// Invoke one stage after checking its dependencies against the real table.
async fn invoke(stage: &dyn Stage, table: Table, ctx: &RunContext) -> Result<Table> {
    let missing: BTreeSet<&str> = stage
        .spec()
        .dependencies()
        .filter(|c| !table.has_column(c))
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::Dependency {
            stage: stage.name().to_string(),
            columns: missing.into_iter().map(str::to_string).collect(),
        });
    }
    stage.process(table, ctx).await
}
