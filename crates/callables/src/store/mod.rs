// Metadata store for installed callables
//
// Records are keyed by (scope, namespace, name, kind). Every mutation advances
// the scope's refresh marker, which remote instances poll to decide whether to
// reconcile.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::signature::{
	CallableKind, CallableSignature, FieldSignature, FunctionSignature, Mode, ProcedureSignature,
	QualifiedName,
};
use crate::types::CypherType;

pub mod file;
pub mod memory;

pub use file::FileMetadataStore;
pub use memory::MemoryMetadataStore;

/// Error type for MetadataStore operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("serialization error: {0}")]
	Serialization(String),
	#[error("storage error: {0}")]
	Storage(String),
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
}

/// Persisted form of an installed callable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
	pub scope: String,
	/// Full namespace, root segment included.
	pub namespace: Vec<String>,
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	pub statement: String,
	#[serde(default)]
	pub inputs: Vec<FieldSignature>,
	#[serde(flatten)]
	pub body: RecordBody,
}

/// Kind-specific part of a record, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RecordBody {
	Procedure {
		#[serde(default)]
		outputs: Vec<FieldSignature>,
		#[serde(default)]
		mode: Mode,
	},
	Function {
		#[serde(rename = "outputType")]
		output_type: CypherType,
		#[serde(rename = "forceSingle", default)]
		force_single: bool,
		#[serde(rename = "mapResult", default)]
		map_result: bool,
	},
}

/// Identity of a record within the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
	pub scope: String,
	pub name: QualifiedName,
	pub kind: CallableKind,
}

impl StoredRecord {
	pub fn new(scope: impl Into<String>, signature: &CallableSignature, statement: impl Into<String>) -> Self {
		let name = signature.name().clone();
		let body = match signature {
			CallableSignature::Procedure(p) => RecordBody::Procedure {
				outputs: p.outputs.clone(),
				mode: p.mode,
			},
			CallableSignature::Function(f) => RecordBody::Function {
				output_type: f.output.clone(),
				force_single: f.force_single,
				map_result: f.map_result,
			},
		};
		Self {
			scope: scope.into(),
			namespace: name.namespace,
			name: name.name,
			description: signature.description().map(str::to_string),
			statement: statement.into(),
			inputs: signature.inputs().to_vec(),
			body,
		}
	}

	pub fn kind(&self) -> CallableKind {
		match self.body {
			RecordBody::Procedure { .. } => CallableKind::Procedure,
			RecordBody::Function { .. } => CallableKind::Function,
		}
	}

	pub fn qualified_name(&self) -> QualifiedName {
		QualifiedName::new(self.namespace.clone(), self.name.clone())
	}

	pub fn key(&self) -> RecordKey {
		RecordKey {
			scope: self.scope.clone(),
			name: self.qualified_name(),
			kind: self.kind(),
		}
	}

	/// Rebuild the compiled signature this record was created from.
	pub fn signature(&self) -> CallableSignature {
		let name = self.qualified_name();
		let inputs = self.inputs.clone();
		let description = self.description.clone();
		match &self.body {
			RecordBody::Procedure { outputs, mode } => {
				CallableSignature::Procedure(Arc::new(ProcedureSignature {
					name,
					inputs,
					outputs: outputs.clone(),
					mode: *mode,
					description,
				}))
			},
			RecordBody::Function {
				output_type,
				force_single,
				map_result,
			} => CallableSignature::Function(Arc::new(FunctionSignature {
				name,
				inputs,
				output: output_type.clone(),
				force_single: *force_single,
				map_result: *map_result,
				description,
			})),
		}
	}

	fn sort_key(&self) -> (String, &'static str) {
		(self.qualified_name().to_string(), self.kind().as_str())
	}
}

/// Durable catalog of installed callables shared by every instance.
///
/// Implementations make each mutation atomic for the single record it
/// touches and advance the scope's marker on every change.
#[async_trait]
pub trait MetadataStore: Send + Sync {
	/// Insert or replace the record with the same key.
	async fn install(&self, record: StoredRecord) -> Result<(), StoreError>;

	/// Remove a record. A miss is not an error and leaves the marker alone.
	async fn drop_one(
		&self,
		scope: &str,
		name: &QualifiedName,
		kind: CallableKind,
	) -> Result<Option<StoredRecord>, StoreError>;

	/// Remove every record of `scope`, returning them sorted by name then kind.
	async fn drop_all(&self, scope: &str) -> Result<Vec<StoredRecord>, StoreError>;

	/// All records of `scope`, sorted by name then kind.
	async fn list(&self, scope: &str) -> Result<Vec<StoredRecord>, StoreError>;

	/// Epoch millis of the last mutation in `scope`; 0 if there never was one.
	async fn last_updated(&self, scope: &str) -> Result<i64, StoreError>;
}

/// In-memory state shared by the store implementations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Catalog {
	#[serde(default)]
	records: Vec<StoredRecord>,
	#[serde(default)]
	last_updated: std::collections::BTreeMap<String, i64>,
}

impl Catalog {
	pub fn install(&mut self, record: StoredRecord) {
		let key = record.key();
		let scope = record.scope.clone();
		match self.records.iter_mut().find(|r| r.key() == key) {
			Some(existing) => *existing = record,
			None => self.records.push(record),
		}
		self.touch(&scope);
	}

	pub fn drop_one(
		&mut self,
		scope: &str,
		name: &QualifiedName,
		kind: CallableKind,
	) -> Option<StoredRecord> {
		let idx = self.records.iter().position(|r| {
			r.scope == scope && r.kind() == kind && r.namespace == name.namespace && r.name == name.name
		})?;
		let removed = self.records.remove(idx);
		self.touch(scope);
		Some(removed)
	}

	pub fn drop_all(&mut self, scope: &str) -> Vec<StoredRecord> {
		let (mut removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.records)
			.into_iter()
			.partition(|r| r.scope == scope);
		self.records = kept;
		if !removed.is_empty() {
			self.touch(scope);
		}
		removed.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
		removed
	}

	pub fn list(&self, scope: &str) -> Vec<StoredRecord> {
		let mut records: Vec<_> = self
			.records
			.iter()
			.filter(|r| r.scope == scope)
			.cloned()
			.collect();
		records.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
		records
	}

	pub fn last_updated(&self, scope: &str) -> i64 {
		self.last_updated.get(scope).copied().unwrap_or_default()
	}

	/// Advance the marker to now, keeping it strictly increasing per scope.
	fn touch(&mut self, scope: &str) {
		let now = chrono::Utc::now().timestamp_millis();
		let marker = self.last_updated.entry(scope.to_string()).or_default();
		*marker = now.max(*marker + 1);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::signature::{Mode, SignatureCompiler};
	use crate::value::Value;

	fn procedure(text: &str) -> CallableSignature {
		CallableSignature::Procedure(Arc::new(
			SignatureCompiler::default()
				.compile_procedure(text, Mode::Write, Some("desc".to_string()))
				.unwrap(),
		))
	}

	fn function(text: &str) -> CallableSignature {
		CallableSignature::Function(Arc::new(
			SignatureCompiler::default()
				.compile_function(text, true, None)
				.unwrap(),
		))
	}

	#[test]
	fn test_record_json_shape() {
		let record = StoredRecord::new(
			"neo4j",
			&procedure("aa.answer(input :: INT = 3) :: (answer :: INT)"),
			"RETURN $input AS answer",
		);
		let json = serde_json::to_value(&record).unwrap();
		assert_eq!(
			json,
			serde_json::json!({
				"scope": "neo4j",
				"namespace": ["custom", "aa"],
				"name": "answer",
				"description": "desc",
				"statement": "RETURN $input AS answer",
				"inputs": [{"name": "input", "type": "INTEGER", "default": 3}],
				"kind": "procedure",
				"outputs": [{"name": "answer", "type": "INTEGER"}],
				"mode": "write",
			})
		);

		let record = StoredRecord::new("neo4j", &function("double(xx :: INT) :: LIST OF INT"), "RETURN 1");
		let json = serde_json::to_value(&record).unwrap();
		assert_eq!(json["kind"], "function");
		assert_eq!(json["outputType"], "LIST OF INTEGER");
		assert_eq!(json["forceSingle"], true);
		assert_eq!(json["mapResult"], false);
	}

	#[test]
	fn test_record_rebuilds_signature() {
		let sig = procedure("aa.answer(input :: MAP = {kk: 'v'}) :: VOID");
		let record = StoredRecord::new("neo4j", &sig, "RETURN 1");
		let json = serde_json::to_string(&record).unwrap();
		let back: StoredRecord = serde_json::from_str(&json).unwrap();
		assert_eq!(back, record);
		assert_eq!(back.signature(), sig);
		assert_eq!(
			back.inputs[0].default,
			Some(Value::Map(crate::value::row([("kk", "v")])))
		);
	}

	#[test]
	fn test_catalog_upsert_and_markers() {
		let mut catalog = Catalog::default();
		let sig = function("answer() :: INT");
		catalog.install(StoredRecord::new("one", &sig, "RETURN 1"));
		let first = catalog.last_updated("one");
		catalog.install(StoredRecord::new("one", &sig, "RETURN 2"));
		let second = catalog.last_updated("one");
		assert!(second > first);
		assert_eq!(catalog.list("one").len(), 1);
		assert_eq!(catalog.list("one")[0].statement, "RETURN 2");
		assert_eq!(catalog.last_updated("two"), 0);

		// same name, other kind, is a distinct record
		catalog.install(StoredRecord::new("one", &procedure("answer() :: VOID"), "RETURN 1"));
		assert_eq!(catalog.list("one").len(), 2);
	}

	#[test]
	fn test_catalog_drop_miss_keeps_marker() {
		let mut catalog = Catalog::default();
		catalog.install(StoredRecord::new("one", &function("answer() :: INT"), "RETURN 1"));
		let marker = catalog.last_updated("one");
		let missing = QualifiedName::from_dotted("custom", "nothing").unwrap();
		assert!(catalog.drop_one("one", &missing, CallableKind::Function).is_none());
		assert_eq!(catalog.last_updated("one"), marker);
	}

	#[test]
	fn test_catalog_drop_all_sorted() {
		let mut catalog = Catalog::default();
		catalog.install(StoredRecord::new("one", &function("zz() :: INT"), "RETURN 1"));
		catalog.install(StoredRecord::new("one", &procedure("aa() :: VOID"), "RETURN 1"));
		catalog.install(StoredRecord::new("one", &function("aa() :: INT"), "RETURN 1"));
		catalog.install(StoredRecord::new("two", &function("bb() :: INT"), "RETURN 1"));
		let removed: Vec<_> = catalog
			.drop_all("one")
			.into_iter()
			.map(|r| { let kind = r.kind(); (r.name, kind) })
			.collect();
		assert_eq!(
			removed,
			vec![
				("aa".to_string(), CallableKind::Function),
				("aa".to_string(), CallableKind::Procedure),
				("zz".to_string(), CallableKind::Function),
			]
		);
		assert!(catalog.list("one").is_empty());
		assert_eq!(catalog.list("two").len(), 1);
	}
}
