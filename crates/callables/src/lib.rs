//! Runtime-installable procedures and functions backed by stored statements.
//!
//! Operators install a callable as a signature string plus the statement that
//! implements it. Definitions are persisted per scope in a [`MetadataStore`]
//! and every instance converges on them by polling the scope's refresh marker.
//! Hosts plug in their own [`QueryEngine`] and [`DispatchTable`].

pub mod config;
pub mod engine;
pub mod error;
pub mod refresh;
pub mod registry;
pub mod service;
pub mod signature;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod value;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{CallablesConfig, ConfigError};
pub use engine::{QueryEngine, QueryResult, StatementExecutionError};
pub use error::{CallableError, InvocationError, RegistrationError, SignatureSyntaxError};
pub use refresh::{ReconcileSummary, RefreshScheduler};
pub use registry::{CallOutput, CallableHandler, CallableRegistry, DispatchTable, InMemoryDispatchTable};
pub use service::{CallableInfo, CustomCallables, InstallFunction, InstallProcedure};
pub use signature::{CallableKind, CallableSignature, Mode, QualifiedName, SignatureCompiler};
pub use store::{FileMetadataStore, MemoryMetadataStore, MetadataStore, StoreError, StoredRecord};
pub use types::CypherType;
pub use value::{Params, Row, Value};
