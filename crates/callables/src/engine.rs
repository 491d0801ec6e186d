// Query engine boundary
//
// The registry never executes statements itself. Hosts supply a QueryEngine
// that runs a backing statement with named parameters and returns its rows.

use futures::stream::{self, BoxStream, StreamExt};
use thiserror::Error;

use crate::value::{Params, Row};

/// An error raised by the engine while executing or streaming a statement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct StatementExecutionError {
	/// Engine-specific status code, if any.
	pub code: Option<String>,
	pub message: String,
}

impl StatementExecutionError {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			code: None,
			message: message.into(),
		}
	}

	pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			code: Some(code.into()),
			message: message.into(),
		}
	}
}

pub type RowStream = BoxStream<'static, Result<Row, StatementExecutionError>>;

/// Result of executing a statement: column names plus a lazy row stream.
pub struct QueryResult {
	pub columns: Vec<String>,
	pub rows: RowStream,
}

impl QueryResult {
	pub fn new(columns: Vec<String>, rows: RowStream) -> Self {
		Self { columns, rows }
	}

	/// A result over rows that are already materialized.
	pub fn from_rows(columns: Vec<String>, rows: Vec<Row>) -> Self {
		Self::new(columns, stream::iter(rows.into_iter().map(Ok)).boxed())
	}

	pub fn empty() -> Self {
		Self::from_rows(Vec::new(), Vec::new())
	}
}

impl std::fmt::Debug for QueryResult {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("QueryResult")
			.field("columns", &self.columns)
			.finish_non_exhaustive()
	}
}

/// Trait for executing backing statements (abstraction over the host engine)
#[async_trait::async_trait]
pub trait QueryEngine: Send + Sync {
	/// Execute `statement` with named `params` against the database `scope`.
	async fn execute(
		&self,
		statement: &str,
		params: Params,
		scope: &str,
	) -> Result<QueryResult, StatementExecutionError>;

	/// Drop cached plans that may reference callables of `scope`.
	fn clear_plan_cache(&self, _scope: &str) {}
}
