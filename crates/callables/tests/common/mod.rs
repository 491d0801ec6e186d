use std::sync::Arc;
use std::time::Duration;

use callables::testing::ScriptedEngine;
use callables::{
	CallablesConfig, CustomCallables, InMemoryDispatchTable, MetadataStore,
};

/// One instance of the host: its own engine and dispatch table, sharing the
/// metadata store with its peers.
pub struct Instance {
	pub callables: CustomCallables,
	pub table: Arc<InMemoryDispatchTable>,
	pub engine: Arc<ScriptedEngine>,
}

impl Instance {
	pub fn new(scope: &str, store: Arc<dyn MetadataStore>, engine: ScriptedEngine) -> Self {
		Self::with_table(scope, store, engine, InMemoryDispatchTable::new())
	}

	pub fn with_table(
		scope: &str,
		store: Arc<dyn MetadataStore>,
		engine: ScriptedEngine,
		table: InMemoryDispatchTable,
	) -> Self {
		let config = CallablesConfig {
			refresh_interval: Duration::from_millis(100),
			default_scope: scope.to_string(),
			..Default::default()
		};
		let engine = Arc::new(engine);
		let table = Arc::new(table);
		let callables = CustomCallables::new(config, store, engine.clone(), table.clone());
		Self {
			callables,
			table,
			engine,
		}
	}
}
