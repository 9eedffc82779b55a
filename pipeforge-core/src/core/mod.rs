//! Core types shared by every module: errors, the table, and capability
//! traits.

pub mod error;
pub mod mock_providers;
pub mod table;
pub mod traits;

pub use error::{ErrorContext, PipelineError, Result};
pub use mock_providers::{FailingProvider, MockProvider};
pub use table::{RowId, RowView, Table, Value};
pub use traits::{Message, Provider, Role};
