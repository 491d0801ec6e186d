// Test doubles for hosts and integration tests

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use parking_lot::Mutex;

use crate::engine::{QueryEngine, QueryResult, StatementExecutionError};
use crate::signature::{CallableKind, QualifiedName};
use crate::store::{MetadataStore, StoreError, StoredRecord};
use crate::value::{Params, Row};

#[derive(Debug, Clone)]
enum Script {
	Rows { columns: Vec<String>, rows: Vec<Row> },
	Fail(StatementExecutionError),
}

/// A statement the engine was asked to run.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
	pub statement: String,
	pub params: Params,
	pub scope: String,
}

/// Query engine answering from canned results keyed by statement text.
/// Unscripted statements return no columns and no rows.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
	scripts: Mutex<HashMap<String, Script>>,
	executions: Mutex<Vec<Execution>>,
	plan_cache_clears: AtomicUsize,
}

impl ScriptedEngine {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn respond(
		self,
		statement: impl Into<String>,
		columns: impl IntoIterator<Item = impl Into<String>>,
		rows: Vec<Row>,
	) -> Self {
		self.scripts.lock().insert(
			statement.into(),
			Script::Rows {
				columns: columns.into_iter().map(Into::into).collect(),
				rows,
			},
		);
		self
	}

	pub fn fail(self, statement: impl Into<String>, error: StatementExecutionError) -> Self {
		self
			.scripts
			.lock()
			.insert(statement.into(), Script::Fail(error));
		self
	}

	pub fn executions(&self) -> Vec<Execution> {
		self.executions.lock().clone()
	}

	pub fn plan_cache_clears(&self) -> usize {
		self.plan_cache_clears.load(Ordering::Relaxed)
	}
}

#[async_trait]
impl QueryEngine for ScriptedEngine {
	async fn execute(
		&self,
		statement: &str,
		params: Params,
		scope: &str,
	) -> Result<QueryResult, StatementExecutionError> {
		self.executions.lock().push(Execution {
			statement: statement.to_string(),
			params,
			scope: scope.to_string(),
		});
		let script = self.scripts.lock().get(statement).cloned();
		match script {
			Some(Script::Rows { columns, rows }) => Ok(QueryResult::from_rows(columns, rows)),
			Some(Script::Fail(e)) => Err(e),
			None => Ok(QueryResult::new(Vec::new(), stream::empty().boxed())),
		}
	}

	fn clear_plan_cache(&self, _scope: &str) {
		self.plan_cache_clears.fetch_add(1, Ordering::Relaxed);
	}
}

/// Metadata store that delegates to another store until told to fail its
/// writes. Reads always go through.
pub struct FailingStore {
	inner: Arc<dyn MetadataStore>,
	failing: AtomicBool,
}

impl FailingStore {
	pub fn new(inner: Arc<dyn MetadataStore>) -> Self {
		Self {
			inner,
			failing: AtomicBool::new(false),
		}
	}

	pub fn fail_writes(&self, failing: bool) {
		self.failing.store(failing, Ordering::Relaxed);
	}

	fn check(&self) -> Result<(), StoreError> {
		if self.failing.load(Ordering::Relaxed) {
			return Err(StoreError::Storage("disk full".to_string()));
		}
		Ok(())
	}
}

#[async_trait]
impl MetadataStore for FailingStore {
	async fn install(&self, record: StoredRecord) -> Result<(), StoreError> {
		self.check()?;
		self.inner.install(record).await
	}

	async fn drop_one(
		&self,
		scope: &str,
		name: &QualifiedName,
		kind: CallableKind,
	) -> Result<Option<StoredRecord>, StoreError> {
		self.check()?;
		self.inner.drop_one(scope, name, kind).await
	}

	async fn drop_all(&self, scope: &str) -> Result<Vec<StoredRecord>, StoreError> {
		self.check()?;
		self.inner.drop_all(scope).await
	}

	async fn list(&self, scope: &str) -> Result<Vec<StoredRecord>, StoreError> {
		self.inner.list(scope).await
	}

	async fn last_updated(&self, scope: &str) -> Result<i64, StoreError> {
		self.inner.last_updated(scope).await
	}
}
