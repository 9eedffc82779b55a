//! Stages backed by a deterministic row function.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    caching::{Cache, CacheLookup, CachedOutput, FingerprintBuilder},
    config_error,
    core::{PipelineError, Result, Table, Value},
    pipeline::{
        context::RunContext,
        stage::{Stage, StageSpec},
    },
};

/// What a row function returns: one value per output column.
///
/// Shorter results are padded with nulls and extra values are dropped, so a
/// function may return a bare value for a single-output stage.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowOutput(pub Vec<Value>);

impl From<Vec<Value>> for RowOutput {
    fn from(values: Vec<Value>) -> Self {
        RowOutput(values)
    }
}

impl From<Value> for RowOutput {
    fn from(value: Value) -> Self {
        RowOutput(vec![value])
    }
}

impl From<bool> for RowOutput {
    fn from(value: bool) -> Self {
        RowOutput(vec![Value::Bool(value)])
    }
}

impl From<i64> for RowOutput {
    fn from(value: i64) -> Self {
        RowOutput(vec![Value::from(value)])
    }
}

impl From<f64> for RowOutput {
    fn from(value: f64) -> Self {
        RowOutput(vec![Value::from(value)])
    }
}

impl From<String> for RowOutput {
    fn from(value: String) -> Self {
        RowOutput(vec![Value::String(value)])
    }
}

impl From<&str> for RowOutput {
    fn from(value: &str) -> Self {
        RowOutput(vec![Value::String(value.to_string())])
    }
}

impl<A: Into<Value>, B: Into<Value>> From<(A, B)> for RowOutput {
    fn from((a, b): (A, B)) -> Self {
        RowOutput(vec![a.into(), b.into()])
    }
}

type RowFn = dyn Fn(&[Value]) -> RowOutput + Send + Sync;

/// A stage that evaluates a pure function on each row's input values.
///
/// Rows are evaluated synchronously in order. The cache key covers the input
/// column names, the row's values and the caller-supplied `logic_id`; bump
/// the id whenever the function's behaviour changes.
pub struct FunctionalStage {
    spec: StageSpec,
    logic_id: String,
    func: Arc<RowFn>,
    private_cache: Option<Arc<dyn Cache>>,
}

impl FunctionalStage {
    /// Create a stage from a spec, a logic version tag and a row function.
    pub fn new<F, R>(spec: StageSpec, logic_id: impl Into<String>, func: F) -> Result<Self>
    where
        F: Fn(&[Value]) -> R + Send + Sync + 'static,
        R: Into<RowOutput>,
    {
        spec.validate()?;
        let logic_id = logic_id.into();
        if logic_id.is_empty() {
            return Err(config_error!(
                "stage '{}' needs a non-empty logic id",
                spec.name
            ));
        }
        Ok(Self {
            spec,
            logic_id,
            func: Arc::new(move |row: &[Value]| func(row).into()),
            private_cache: None,
        })
    }

    /// Create a stage computing a single boolean column, typically used as
    /// another stage's filter.
    pub fn filter<F>(spec: StageSpec, logic_id: impl Into<String>, predicate: F) -> Result<Self>
    where
        F: Fn(&[Value]) -> bool + Send + Sync + 'static,
    {
        if spec.output_columns.len() != 1 {
            return Err(config_error!(
                "filter stage '{}' must declare exactly one output column, got {}",
                spec.name,
                spec.output_columns.len()
            ));
        }
        Self::new(spec, logic_id, move |row: &[Value]| Value::Bool(predicate(row)))
    }

    /// Use `cache` whenever a run supplies no cache of its own.
    pub fn with_private_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.private_cache = Some(cache);
        self
    }

    /// Version tag folded into every cache key.
    pub fn logic_id(&self) -> &str {
        &self.logic_id
    }

    fn cache_key(&self, values: &[Value]) -> Result<String> {
        FingerprintBuilder::new("functional")
            .component("stage", &self.spec.name)?
            .component("inputs", &self.spec.input_columns)?
            .component("outputs", &self.spec.output_columns)?
            .component("values", values)?
            .component("logic", &self.logic_id)?
            .finish()
    }

    fn evaluate(&self, values: &[Value]) -> CachedOutput {
        let RowOutput(mut output) = (self.func)(values);
        output.resize(self.spec.output_columns.len(), Value::Null);
        output
    }
}

#[async_trait]
impl Stage for FunctionalStage {
    fn spec(&self) -> &StageSpec {
        &self.spec
    }

    async fn compute(&self, mut table: Table, ctx: &RunContext) -> Result<Table> {
        let cache = ctx.cache().or(self.private_cache.as_ref());
        let arity = self.spec.output_columns.len();
        let mut columns = vec![Vec::with_capacity(table.num_rows()); arity];
        let (mut hits, mut misses) = (0u64, 0u64);

        for row in table.rows() {
            let values = row.values(&self.spec.input_columns);
            let output = match cache {
                None => self.evaluate(&values),
                Some(cache) => {
                    let key = self.cache_key(&values)?;
                    match cache.get(&key) {
                        CacheLookup::Hit(output) => {
                            if output.len() != arity {
                                return Err(PipelineError::CacheConsistency {
                                    stage: self.spec.name.clone(),
                                    expected: arity,
                                    found: output.len(),
                                });
                            }
                            hits += 1;
                            output
                        }
                        CacheLookup::Miss => {
                            misses += 1;
                            let output = self.evaluate(&values);
                            cache.set(key, output.clone());
                            output
                        }
                    }
                }
            };
            for (column, value) in columns.iter_mut().zip(output) {
                column.push(value);
            }
        }

        for (name, values) in self.spec.output_columns.iter().zip(columns) {
            table.set_column(name.clone(), values)?;
        }
        if cache.is_some() {
            tracing::debug!(stage = %self.spec.name, hits, misses, "Row function cache");
        }
        Ok(table)
    }

    fn clear_cache(&self) {
        if let Some(cache) = &self.private_cache {
            cache.clear();
        }
    }
}

impl std::fmt::Debug for FunctionalStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionalStage")
            .field("spec", &self.spec)
            .field("logic_id", &self.logic_id)
            .field("private_cache", &self.private_cache.is_some())
            .finish()
    }
}
