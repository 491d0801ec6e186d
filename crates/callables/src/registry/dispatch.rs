// Host dispatch boundary
//
// The host engine owns the table it dispatches calls through. The registry
// only needs to add and remove bindings, so the contract is kept narrow.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arc_swap::ArcSwap;
use futures::stream::BoxStream;
use tracing::debug;

use crate::error::{InvocationError, RegistrationError};
use crate::signature::{CallableKind, CallableSignature, QualifiedName};
use crate::value::{Row, Value};

pub type RecordStream = BoxStream<'static, Result<Row, InvocationError>>;

/// What a handler hands back to the host.
pub enum CallOutput {
	/// Procedure records, produced lazily.
	Records(RecordStream),
	/// A function's single value.
	Value(Value),
}

impl std::fmt::Debug for CallOutput {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			CallOutput::Records(_) => f.write_str("Records(..)"),
			CallOutput::Value(v) => f.debug_tuple("Value").field(v).finish(),
		}
	}
}

/// A dispatchable callable. Positional arguments follow the signature's
/// input order.
#[async_trait::async_trait]
pub trait CallableHandler: Send + Sync {
	fn signature(&self) -> &CallableSignature;

	async fn invoke(&self, args: Vec<Value>) -> Result<CallOutput, InvocationError>;
}

/// The host's table of callables.
pub trait DispatchTable: Send + Sync {
	/// Bind the handler under its signature's name and kind, atomically
	/// replacing any previous binding.
	fn register(&self, handler: Arc<dyn CallableHandler>) -> Result<(), RegistrationError>;

	/// Remove a binding. Returns whether one existed.
	fn unregister(&self, kind: CallableKind, name: &QualifiedName) -> bool;
}

type BindingKey = (CallableKind, String);
type Bindings = HashMap<BindingKey, Arc<dyn CallableHandler>>;

/// Copy-on-write dispatch table. Readers load a snapshot and keep their own
/// `Arc` to the handler, so replacing a binding never disturbs calls in flight.
pub struct InMemoryDispatchTable {
	bindings: ArcSwap<Bindings>,
	reserved: HashSet<BindingKey>,
}

impl Default for InMemoryDispatchTable {
	fn default() -> Self {
		Self::new()
	}
}

impl InMemoryDispatchTable {
	pub fn new() -> Self {
		Self {
			bindings: ArcSwap::from_pointee(HashMap::new()),
			reserved: HashSet::new(),
		}
	}

	/// Reserve a fully qualified name for a host built-in.
	pub fn with_reserved(mut self, kind: CallableKind, name: impl Into<String>) -> Self {
		self.reserved.insert((kind, name.into()));
		self
	}

	pub fn get(&self, kind: CallableKind, name: &str) -> Option<Arc<dyn CallableHandler>> {
		self.bindings.load().get(&(kind, name.to_string())).cloned()
	}

	pub fn len(&self) -> usize {
		self.bindings.load().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Fully qualified names bound for `kind`, sorted.
	pub fn names(&self, kind: CallableKind) -> Vec<String> {
		let mut names: Vec<_> = self
			.bindings
			.load()
			.keys()
			.filter(|(k, _)| *k == kind)
			.map(|(_, name)| name.clone())
			.collect();
		names.sort();
		names
	}

	/// Call a procedure by its fully qualified name.
	pub async fn call_procedure(
		&self,
		name: &str,
		args: Vec<Value>,
	) -> Result<RecordStream, InvocationError> {
		match self.call(CallableKind::Procedure, name, args).await? {
			CallOutput::Records(records) => Ok(records),
			CallOutput::Value(_) => Err(InvocationError::InvalidInput(format!(
				"'{name}' returned a value instead of records"
			))),
		}
	}

	/// Call a function by its fully qualified name.
	pub async fn call_function(&self, name: &str, args: Vec<Value>) -> Result<Value, InvocationError> {
		match self.call(CallableKind::Function, name, args).await? {
			CallOutput::Value(value) => Ok(value),
			CallOutput::Records(_) => Err(InvocationError::InvalidInput(format!(
				"'{name}' returned records instead of a value"
			))),
		}
	}

	async fn call(
		&self,
		kind: CallableKind,
		name: &str,
		args: Vec<Value>,
	) -> Result<CallOutput, InvocationError> {
		let handler = self
			.get(kind, name)
			.ok_or_else(|| InvocationError::UnknownCallable {
				kind,
				name: name.to_string(),
			})?;
		handler.invoke(args).await
	}
}

impl DispatchTable for InMemoryDispatchTable {
	fn register(&self, handler: Arc<dyn CallableHandler>) -> Result<(), RegistrationError> {
		let kind = handler.signature().kind();
		let key = (kind, handler.signature().name().to_string());
		if self.reserved.contains(&key) {
			return Err(RegistrationError::collision(kind, key.1));
		}
		self.bindings.rcu(|current| {
			let mut next = HashMap::clone(current);
			next.insert(key.clone(), Arc::clone(&handler));
			next
		});
		debug!(target: "custom_callables", kind = %kind, name = %key.1, "bound callable");
		Ok(())
	}

	fn unregister(&self, kind: CallableKind, name: &QualifiedName) -> bool {
		let key = (kind, name.to_string());
		let previous = self.bindings.rcu(|current| {
			let mut next = HashMap::clone(current);
			next.remove(&key);
			next
		});
		previous.contains_key(&key)
	}
}
