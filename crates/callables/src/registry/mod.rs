// Runtime registry of installed callables
//
// Owns the bookkeeping of which signatures this instance has bound in the
// host dispatch table, and turns (signature, statement) pairs into handlers.

pub mod dispatch;
pub mod invoke;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

pub use dispatch::{CallOutput, CallableHandler, DispatchTable, InMemoryDispatchTable, RecordStream};
pub use invoke::{StatementHandler, bind_params, collect_records, function_value};

use crate::engine::QueryEngine;
use crate::error::RegistrationError;
use crate::signature::{CallableKind, CallableSignature, QualifiedName};

pub type BindingKey = (CallableKind, QualifiedName);

#[derive(Debug, Clone)]
struct Binding {
	signature: CallableSignature,
	/// None once tombstoned.
	statement: Option<String>,
}

impl Binding {
	fn live(&self) -> bool {
		self.statement.is_some()
	}
}

/// What a name was bound to before a change, for rolling the change back.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorBinding(Option<(CallableSignature, Option<String>)>);

/// Registers statement-backed callables for one scope.
pub struct CallableRegistry {
	dispatch: Arc<dyn DispatchTable>,
	engine: Arc<dyn QueryEngine>,
	scope: Arc<str>,
	bindings: RwLock<HashMap<BindingKey, Binding>>,
}

impl CallableRegistry {
	pub fn new(
		dispatch: Arc<dyn DispatchTable>,
		engine: Arc<dyn QueryEngine>,
		scope: impl Into<Arc<str>>,
	) -> Self {
		Self {
			dispatch,
			engine,
			scope: scope.into(),
			bindings: RwLock::new(HashMap::new()),
		}
	}

	pub fn scope(&self) -> &str {
		&self.scope
	}

	pub fn engine(&self) -> &Arc<dyn QueryEngine> {
		&self.engine
	}

	/// Bind `signature` to `statement`, replacing any binding of the same name
	/// and kind. A `None` statement binds a tombstone.
	pub fn register(
		&self,
		signature: CallableSignature,
		statement: Option<String>,
	) -> Result<(), RegistrationError> {
		let key = (signature.kind(), signature.name().clone());
		let live = statement.is_some();
		let handler = StatementHandler::new(
			signature.clone(),
			statement.clone(),
			Arc::clone(&self.engine),
			Arc::clone(&self.scope),
		);
		self.dispatch.register(Arc::new(handler))?;
		debug!(
			target: "custom_callables",
			scope = %self.scope,
			kind = %key.0,
			name = %key.1,
			live,
			"registered callable"
		);
		self
			.bindings
			.write()
			.insert(key, Binding { signature, statement });
		Ok(())
	}

	/// Replace a live binding with a tombstone. Unknown names are ignored.
	pub fn tombstone(&self, kind: CallableKind, name: &QualifiedName) -> Result<(), RegistrationError> {
		let signature = {
			let bindings = self.bindings.read();
			match bindings.get(&(kind, name.clone())) {
				Some(binding) if binding.live() => binding.signature.clone(),
				_ => return Ok(()),
			}
		};
		info!(target: "custom_callables", scope = %self.scope, kind = %kind, name = %name, "removing callable");
		self.register(signature, None)
	}

	/// Names with a live (non-tombstone) binding.
	pub fn live_names(&self) -> HashSet<BindingKey> {
		self
			.bindings
			.read()
			.iter()
			.filter(|(_, b)| b.live())
			.map(|(k, _)| k.clone())
			.collect()
	}

	pub fn is_live(&self, kind: CallableKind, name: &QualifiedName) -> bool {
		self
			.bindings
			.read()
			.get(&(kind, name.clone()))
			.is_some_and(Binding::live)
	}

	pub fn signature(&self, kind: CallableKind, name: &QualifiedName) -> Option<CallableSignature> {
		self
			.bindings
			.read()
			.get(&(kind, name.clone()))
			.map(|b| b.signature.clone())
	}

	/// Capture the current binding of `signature`'s name.
	pub fn prior(&self, signature: &CallableSignature) -> PriorBinding {
		PriorBinding(
			self
				.bindings
				.read()
				.get(&(signature.kind(), signature.name().clone()))
				.map(|b| (b.signature.clone(), b.statement.clone())),
		)
	}

	/// Put `signature`'s name back the way [`Self::prior`] saw it. A name
	/// that was never bound ends up tombstoned.
	pub fn restore(
		&self,
		signature: &CallableSignature,
		prior: PriorBinding,
	) -> Result<(), RegistrationError> {
		match prior.0 {
			Some((signature, statement)) => self.register(signature, statement),
			None => self.tombstone(signature.kind(), signature.name()),
		}
	}

	/// Remove every binding, tombstones included, from the host.
	pub fn clear(&self) {
		let keys: Vec<_> = self.bindings.write().drain().map(|(k, _)| k).collect();
		for (kind, name) in &keys {
			self.dispatch.unregister(*kind, name);
		}
		if !keys.is_empty() {
			info!(target: "custom_callables", scope = %self.scope, count = keys.len(), "unregistered callables");
		}
	}
}
