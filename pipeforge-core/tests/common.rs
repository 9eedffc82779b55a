//! Shared stage builders and tables for integration tests

#![allow(dead_code)]

use pipeforge_core::prelude::*;
use serde_json::json;

/// Install a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Table with a single integer column.
pub fn int_table(column: &str, values: &[i64]) -> Table {
    Table::from_columns([(column, values.iter().map(|v| json!(v)).collect::<Vec<_>>())])
        .expect("single column table")
}

/// Single-input integer stage.
pub fn int_stage(
    name: &str,
    input: &str,
    output: &str,
    logic_id: &str,
    f: fn(i64) -> i64,
) -> FunctionalStage {
    FunctionalStage::new(
        StageSpec::new(name).inputs([input]).outputs([output]),
        logic_id,
        move |row: &[Value]| f(row[0].as_i64().unwrap_or_default()),
    )
    .expect("valid stage")
}

/// Integer column as a vector, nulls as `None`.
pub fn ints(table: &Table, column: &str) -> Vec<Option<i64>> {
    table
        .column(column)
        .unwrap_or_else(|| panic!("column '{column}' missing"))
        .iter()
        .map(Value::as_i64)
        .collect()
}
