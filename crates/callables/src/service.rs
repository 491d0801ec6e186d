// Operator surface: install, drop and list custom callables
//
// Writes go to the metadata store first. On the instance that serves the
// target scope the registry is updated in the same call; every other
// instance converges through its refresh scheduler.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::CallablesConfig;
use crate::engine::QueryEngine;
use crate::error::CallableError;
use crate::refresh::{ReconcileSummary, RefreshScheduler};
use crate::registry::{CallableRegistry, DispatchTable};
use crate::signature::{
	CallableKind, CallableSignature, FieldSignature, Mode, QualifiedName, SignatureCompiler,
};
use crate::store::{MetadataStore, RecordBody, StoredRecord};

/// Options for [`CustomCallables::install_procedure`].
#[derive(Debug, Clone, Default)]
pub struct InstallProcedure {
	pub scope: Option<String>,
	/// One of read, write, schema, admin (case-insensitive). Defaults to read.
	pub mode: Option<String>,
	pub description: Option<String>,
}

/// Options for [`CustomCallables::install_function`].
#[derive(Debug, Clone, Default)]
pub struct InstallFunction {
	pub scope: Option<String>,
	pub force_single: bool,
	pub description: Option<String>,
}

/// Listing entry for an installed callable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallableInfo {
	#[serde(rename = "type")]
	pub kind: CallableKind,
	/// Name without the root namespace.
	pub name: String,
	pub description: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub mode: Option<Mode>,
	pub statement: String,
	/// `[name, type]` or `[name, type, default]`.
	pub inputs: Vec<Vec<String>>,
	pub outputs: OutputsInfo,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub force_single: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutputsInfo {
	Fields(Vec<[String; 2]>),
	Type(String),
}

impl From<&StoredRecord> for CallableInfo {
	fn from(record: &StoredRecord) -> Self {
		let inputs = record.inputs.iter().map(input_info).collect();
		let (mode, outputs, force_single) = match &record.body {
			RecordBody::Procedure { outputs, mode } => (
				Some(*mode),
				OutputsInfo::Fields(
					outputs
						.iter()
						.map(|f| [f.name.clone(), f.ty.pretty()])
						.collect(),
				),
				None,
			),
			RecordBody::Function {
				output_type,
				force_single,
				..
			} => (None, OutputsInfo::Type(output_type.pretty()), Some(*force_single)),
		};
		Self {
			kind: record.kind(),
			name: record.qualified_name().local_name(),
			description: record.description.clone(),
			mode,
			statement: record.statement.clone(),
			inputs,
			outputs,
			force_single,
		}
	}
}

fn input_info(field: &FieldSignature) -> Vec<String> {
	let mut info = vec![field.name.clone(), field.ty.pretty()];
	if let Some(default) = &field.default {
		info.push(default.to_string());
	}
	info
}

/// Entry point tying the compiler, store, registry and scheduler together
/// for one instance.
pub struct CustomCallables {
	config: CallablesConfig,
	compiler: SignatureCompiler,
	store: Arc<dyn MetadataStore>,
	registry: Arc<CallableRegistry>,
	scheduler: Arc<RefreshScheduler>,
}

impl CustomCallables {
	pub fn new(
		config: CallablesConfig,
		store: Arc<dyn MetadataStore>,
		engine: Arc<dyn QueryEngine>,
		dispatch: Arc<dyn DispatchTable>,
	) -> Self {
		let registry = Arc::new(CallableRegistry::new(
			dispatch,
			engine,
			config.default_scope.as_str(),
		));
		let scheduler = Arc::new(RefreshScheduler::new(
			Arc::clone(&registry),
			Arc::clone(&store),
			config.refresh_interval,
		));
		Self {
			compiler: SignatureCompiler::new(config.root_namespace.clone()),
			config,
			store,
			registry,
			scheduler,
		}
	}

	pub fn config(&self) -> &CallablesConfig {
		&self.config
	}

	pub fn registry(&self) -> &Arc<CallableRegistry> {
		&self.registry
	}

	pub fn scheduler(&self) -> &Arc<RefreshScheduler> {
		&self.scheduler
	}

	/// Load the scope's callables and start polling for changes.
	pub async fn start(&self) -> Result<ReconcileSummary, CallableError> {
		Ok(self.scheduler.become_available().await?)
	}

	pub fn stop(&self) {
		self.scheduler.become_unavailable();
	}

	/// Run one refresh poll now instead of waiting for the timer.
	pub async fn refresh(&self) -> Result<Option<ReconcileSummary>, CallableError> {
		Ok(self.scheduler.tick().await?)
	}

	pub async fn install_procedure(
		&self,
		signature: &str,
		statement: &str,
		options: InstallProcedure,
	) -> Result<(), CallableError> {
		let mode = match options.mode.as_deref() {
			Some(mode) => mode.parse()?,
			None => Mode::default(),
		};
		let compiled = self
			.compiler
			.compile_procedure(signature, mode, options.description)?;
		self
			.install(
				options.scope,
				CallableSignature::Procedure(Arc::new(compiled)),
				statement,
			)
			.await
	}

	pub async fn install_function(
		&self,
		signature: &str,
		statement: &str,
		options: InstallFunction,
	) -> Result<(), CallableError> {
		let compiled =
			self
				.compiler
				.compile_function(signature, options.force_single, options.description)?;
		self
			.install(
				options.scope,
				CallableSignature::Function(Arc::new(compiled)),
				statement,
			)
			.await
	}

	/// Remove a procedure. Returns false when nothing was installed under
	/// that name.
	pub async fn drop_procedure(&self, name: &str, scope: Option<&str>) -> Result<bool, CallableError> {
		self.drop_one(CallableKind::Procedure, name, scope).await
	}

	/// Remove a function. Returns false when nothing was installed under
	/// that name.
	pub async fn drop_function(&self, name: &str, scope: Option<&str>) -> Result<bool, CallableError> {
		self.drop_one(CallableKind::Function, name, scope).await
	}

	/// Remove every callable of the scope, returning what was removed sorted by
	/// name then type.
	pub async fn drop_all(&self, scope: Option<&str>) -> Result<Vec<CallableInfo>, CallableError> {
		let scope = self.scope(scope);
		let _guard = self.local_guard(scope).await;
		let removed = self.store.drop_all(scope).await?;
		if self.is_local(scope) {
			for record in &removed {
				self.registry.tombstone(record.kind(), &record.qualified_name())?;
			}
		}
		info!(target: "custom_callables", scope, count = removed.len(), "dropped all callables");
		Ok(removed.iter().map(CallableInfo::from).collect())
	}

	/// Installed callables of the scope, sorted by name then type.
	pub async fn list(&self, scope: Option<&str>) -> Result<Vec<CallableInfo>, CallableError> {
		let records = self.store.list(self.scope(scope)).await?;
		Ok(records.iter().map(CallableInfo::from).collect())
	}

	async fn install(
		&self,
		scope: Option<String>,
		signature: CallableSignature,
		statement: &str,
	) -> Result<(), CallableError> {
		let scope = self.scope(scope.as_deref()).to_string();
		let record = StoredRecord::new(&scope, &signature, statement);
		let _guard = self.local_guard(&scope).await;
		let prior = self.is_local(&scope).then(|| self.registry.prior(&signature));
		if prior.is_some() {
			// the host decides first, so a rejected signature is never stored
			self
				.registry
				.register(signature.clone(), Some(statement.to_string()))?;
		}
		if let Err(e) = self.store.install(record).await {
			if let Some(prior) = prior
				&& let Err(restore) = self.registry.restore(&signature, prior)
			{
				warn!(
					target: "custom_callables",
					name = %signature.name(),
					error = %restore,
					"failed to restore binding after store error"
				);
			}
			return Err(e.into());
		}
		info!(
			target: "custom_callables",
			scope = %scope,
			kind = %signature.kind(),
			name = %signature.name(),
			"installed callable"
		);
		Ok(())
	}

	async fn drop_one(
		&self,
		kind: CallableKind,
		name: &str,
		scope: Option<&str>,
	) -> Result<bool, CallableError> {
		let scope = self.scope(scope);
		let name = QualifiedName::from_dotted(self.compiler.root(), name)?;
		let _guard = self.local_guard(scope).await;
		let removed = self.store.drop_one(scope, &name, kind).await?;
		if self.is_local(scope) {
			self.registry.tombstone(kind, &name)?;
		}
		info!(
			target: "custom_callables",
			scope,
			kind = %kind,
			name = %name,
			found = removed.is_some(),
			"dropped callable"
		);
		Ok(removed.is_some())
	}

	fn scope<'a>(&'a self, scope: Option<&'a str>) -> &'a str {
		scope.unwrap_or(&self.config.default_scope)
	}

	fn is_local(&self, scope: &str) -> bool {
		scope == self.registry.scope()
	}

	async fn local_guard(&self, scope: &str) -> Option<tokio::sync::MutexGuard<'_, ()>> {
		if self.is_local(scope) {
			Some(self.scheduler.lock().await)
		} else {
			None
		}
	}
}
