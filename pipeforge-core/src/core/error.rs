//! Unified error handling for the pipeline engine
//!
//! Every failure surfaced by `Pipeline::run` / `Pipeline::run_stage` is a
//! [`PipelineError`]. None of them are swallowed internally; the only
//! recovery the engine performs on its own is the bounded provider retry in
//! [`crate::async_processing::RetryPolicy`].

use crate::core::table::{RowId, Value};

/// Main error type for the pipeline engine
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A required column is neither present in the table nor produced by any
    /// registered stage
    #[error(
        "Stage '{stage}' depends on columns that no stage produces: {columns:?}. \
         Solution: add them to the input table or register a producing stage"
    )]
    Dependency {
        /// Stage whose dependencies could not be satisfied
        stage: String,
        /// Unresolvable column names, sorted
        columns: Vec<String>,
    },

    /// Dependency resolution re-entered a stage that was still being resolved
    #[error("Cyclic dependency detected: {}", path.join(" -> "))]
    CyclicDependency {
        /// Stage chain from the first in-progress stage back to itself
        path: Vec<String>,
    },

    /// A column the stage needs at execution time is absent
    #[error("Stage '{stage}' expected column '{column}' but it is missing")]
    MissingColumn {
        /// Stage that observed the missing column
        stage: String,
        /// Missing column name
        column: String,
    },

    /// A filter column holds a non-boolean value
    #[error(
        "Stage '{stage}': filter column '{column}' must be boolean, got {found} at row {row}"
    )]
    FilterType {
        /// Stage whose filter failed
        stage: String,
        /// Filter column name
        column: String,
        /// Offending row label
        row: RowId,
        /// The non-boolean value found
        found: Value,
    },

    /// Failure reported by the generation provider
    #[error("Provider error after {attempts} attempt(s): {message}")]
    Provider {
        /// Provider-supplied failure description
        message: String,
        /// How many calls were made before giving up
        attempts: u32,
    },

    /// A generative stage ran without a provider in the run context
    #[error(
        "Stage '{stage}' requires a generation provider. \
         Solution: pass one with RunContext::with_provider"
    )]
    ProviderMissing {
        /// Stage that needed the provider
        stage: String,
    },

    /// A cached output tuple does not match the stage's output arity
    #[error("Stage '{stage}': cached value has {found} values, expected {expected}")]
    CacheConsistency {
        /// Stage that read the entry
        stage: String,
        /// Declared output column count
        expected: usize,
        /// Length of the cached tuple
        found: usize,
    },

    /// Two stages declare the same output column
    #[error("Column '{column}' is produced by both '{first}' and '{second}'")]
    DuplicateProducer {
        /// Contested column
        column: String,
        /// Stage registered first
        first: String,
        /// Stage registered second
        second: String,
    },

    /// Table shape violations (length mismatch, unknown row)
    #[error("Table error: {message}")]
    Table {
        /// Error message
        message: String,
    },

    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O errors from configuration file loading
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serde JSON errors (cache fingerprints, JSON configs)
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The run was cancelled while a stage was executing
    #[error("Stage '{stage}' was cancelled")]
    Cancelled {
        /// Stage that observed the cancellation
        stage: String,
    },
}

impl PipelineError {
    /// Whether retrying the failed operation could succeed.
    ///
    /// Only provider failures qualify; every other variant is deterministic
    /// given the same pipeline and table.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::Provider { .. })
    }

    /// Create a provider error for a single failed call.
    pub fn provider(message: impl Into<String>) -> Self {
        PipelineError::Provider {
            message: message.into(),
            attempts: 1,
        }
    }

    /// Create a table shape error.
    pub fn table(message: impl Into<String>) -> Self {
        PipelineError::Table {
            message: message.into(),
        }
    }
}

/// Convenient Result type alias
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn with_context(self, context: &str) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<PipelineError>,
{
    fn with_context(self, context: &str) -> Result<T> {
        self.map_err(|e| match e.into() {
            PipelineError::Config { message } => PipelineError::Config {
                message: format!("{context}: {message}"),
            },
            PipelineError::Table { message } => PipelineError::Table {
                message: format!("{context}: {message}"),
            },
            PipelineError::Provider { message, attempts } => PipelineError::Provider {
                message: format!("{context}: {message}"),
                attempts,
            },
            PipelineError::Io(err) => PipelineError::Config {
                message: format!("{context}: {err}"),
            },
            other => other,
        })
    }
}

/// Creates a configuration error with a message
#[macro_export]
macro_rules! config_error {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::PipelineError::Config {
            message: format!($fmt $(, $arg)*),
        }
    };
    ($msg:expr) => {
        $crate::PipelineError::Config {
            message: $msg.to_string(),
        }
    };
}
