//! Column-oriented table used as the unit of work between stages.
//!
//! Rows carry a stable [`RowId`] assigned at construction. Selecting,
//! filtering and projecting produce copies that keep those labels, which is
//! what lets a stage compute on a subset and scatter results back into the
//! original positions.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::error::{PipelineError, Result};

/// A single cell value.
pub type Value = serde_json::Value;

/// Stable row label, preserved across copies and subsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowId(pub usize);

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered rows with named columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    index: Vec<RowId>,
    columns: IndexMap<String, Vec<Value>>,
}

impl Table {
    /// Create a table with `num_rows` rows and no columns.
    pub fn new(num_rows: usize) -> Self {
        Self {
            index: (0..num_rows).map(RowId).collect(),
            columns: IndexMap::new(),
        }
    }

    /// Build a table from `(name, values)` pairs. All columns must have the
    /// same length.
    pub fn from_columns<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Vec<Value>)>,
        S: Into<String>,
    {
        let mut table: Option<Table> = None;
        for (name, values) in columns {
            let t = table.get_or_insert_with(|| Table::new(values.len()));
            t.set_column(name, values)?;
        }
        Ok(table.unwrap_or_default())
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.index.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Row labels in order.
    pub fn index(&self) -> &[RowId] {
        &self.index
    }

    /// Whether a column with this name exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Column names in insertion order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Read a whole column.
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Read one cell by row position.
    pub fn value(&self, position: usize, column: &str) -> Option<&Value> {
        self.columns.get(column).and_then(|c| c.get(position))
    }

    /// Add or overwrite a column. The length must equal the row count.
    pub fn set_column(&mut self, name: impl Into<String>, values: Vec<Value>) -> Result<()> {
        let name = name.into();
        if values.len() != self.index.len() {
            return Err(PipelineError::table(format!(
                "column '{name}' has {} values but the table has {} rows",
                values.len(),
                self.index.len()
            )));
        }
        self.columns.insert(name, values);
        Ok(())
    }

    /// Set every row of a column to the same value, creating it if needed.
    pub fn fill_column(&mut self, name: impl Into<String>, value: &Value) {
        let values = vec![value.clone(); self.index.len()];
        self.columns.insert(name.into(), values);
    }

    /// Overwrite one cell by row position.
    pub fn set_value(&mut self, position: usize, column: &str, value: Value) -> Result<()> {
        let num_rows = self.index.len();
        let cells = self
            .columns
            .get_mut(column)
            .ok_or_else(|| PipelineError::table(format!("unknown column '{column}'")))?;
        let cell = cells.get_mut(position).ok_or_else(|| {
            PipelineError::table(format!("row position {position} out of range ({num_rows} rows)"))
        })?;
        *cell = value;
        Ok(())
    }

    /// Copy of the rows at `positions`, in the given order, with their labels.
    pub fn select(&self, positions: &[usize]) -> Result<Table> {
        if let Some(&bad) = positions.iter().find(|&&p| p >= self.index.len()) {
            return Err(PipelineError::table(format!(
                "row position {bad} out of range ({} rows)",
                self.index.len()
            )));
        }
        Ok(Table {
            index: positions.iter().map(|&p| self.index[p]).collect(),
            columns: self
                .columns
                .iter()
                .map(|(name, cells)| {
                    (name.clone(), positions.iter().map(|&p| cells[p].clone()).collect())
                })
                .collect(),
        })
    }

    /// Copy of the rows for which `predicate` holds.
    pub fn filter_rows<F>(&self, mut predicate: F) -> Table
    where
        F: FnMut(RowView<'_>) -> bool,
    {
        let positions: Vec<usize> = (0..self.num_rows())
            .filter(|&p| predicate(self.row(p)))
            .collect();
        Table {
            index: positions.iter().map(|&p| self.index[p]).collect(),
            columns: self
                .columns
                .iter()
                .map(|(name, cells)| {
                    (name.clone(), positions.iter().map(|&p| cells[p].clone()).collect())
                })
                .collect(),
        }
    }

    /// Copy keeping only the named columns (in the given order). Unknown
    /// names are skipped.
    pub fn project<S: AsRef<str>>(&self, columns: &[S]) -> Table {
        Table {
            index: self.index.clone(),
            columns: columns
                .iter()
                .filter_map(|c| {
                    self.columns
                        .get_key_value(c.as_ref())
                        .map(|(k, v)| (k.clone(), v.clone()))
                })
                .collect(),
        }
    }

    /// Scatter `columns` from `source` into this table, matching rows by
    /// label. Rows of `self` absent from `source` are left untouched; a
    /// source row unknown to `self` is an error.
    pub fn assign_by_index<S: AsRef<str>>(&mut self, source: &Table, columns: &[S]) -> Result<()> {
        let positions: std::collections::HashMap<RowId, usize> = self
            .index
            .iter()
            .enumerate()
            .map(|(pos, id)| (*id, pos))
            .collect();
        let targets = source
            .index
            .iter()
            .map(|id| {
                positions
                    .get(id)
                    .copied()
                    .ok_or_else(|| PipelineError::table(format!("row {id} not present in target")))
            })
            .collect::<Result<Vec<usize>>>()?;

        for column in columns {
            let column = column.as_ref();
            let values = source.column(column).ok_or_else(|| {
                PipelineError::table(format!("source has no column '{column}'"))
            })?;
            let num_rows = self.index.len();
            let cells = self
                .columns
                .entry(column.to_string())
                .or_insert_with(|| vec![Value::Null; num_rows]);
            for (target, value) in targets.iter().zip(values) {
                cells[*target] = value.clone();
            }
        }
        Ok(())
    }

    /// Borrowed view of one row.
    pub fn row(&self, position: usize) -> RowView<'_> {
        RowView {
            table: self,
            position,
        }
    }

    /// Iterate over all rows in order.
    pub fn rows(&self) -> impl Iterator<Item = RowView<'_>> {
        (0..self.num_rows()).map(move |p| self.row(p))
    }
}

/// Borrowed view of a single row.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    table: &'a Table,
    position: usize,
}

impl<'a> RowView<'a> {
    /// Position of the row within its table.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Stable label of the row.
    pub fn id(&self) -> RowId {
        self.table.index[self.position]
    }

    /// Cell value for a column, if the column exists.
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.table.value(self.position, column)
    }

    /// Cell values for `columns`, in order. Missing columns read as null.
    pub fn values<S: AsRef<str>>(&self, columns: &[S]) -> Vec<Value> {
        columns
            .iter()
            .map(|c| self.get(c.as_ref()).cloned().unwrap_or(Value::Null))
            .collect()
    }
}
