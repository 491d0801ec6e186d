//! In-memory implementation of MetadataStore.

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Catalog, MetadataStore, StoreError, StoredRecord};
use crate::signature::{CallableKind, QualifiedName};

/// Shared in-process metadata store.
///
/// Every instance in one process can hold the same `Arc<MemoryMetadataStore>`,
/// which makes it the stand-in for a shared database in tests and
/// single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
	catalog: Mutex<Catalog>,
}

impl MemoryMetadataStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of records across every scope.
	pub fn len(&self) -> usize {
		self.catalog.lock().records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
	async fn install(&self, record: StoredRecord) -> Result<(), StoreError> {
		self.catalog.lock().install(record);
		Ok(())
	}

	async fn drop_one(
		&self,
		scope: &str,
		name: &QualifiedName,
		kind: CallableKind,
	) -> Result<Option<StoredRecord>, StoreError> {
		Ok(self.catalog.lock().drop_one(scope, name, kind))
	}

	async fn drop_all(&self, scope: &str) -> Result<Vec<StoredRecord>, StoreError> {
		Ok(self.catalog.lock().drop_all(scope))
	}

	async fn list(&self, scope: &str) -> Result<Vec<StoredRecord>, StoreError> {
		Ok(self.catalog.lock().list(scope))
	}

	async fn last_updated(&self, scope: &str) -> Result<i64, StoreError> {
		Ok(self.catalog.lock().last_updated(scope))
	}
}
