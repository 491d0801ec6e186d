// Error types for the callable registry

use std::fmt;

use thiserror::Error;

use crate::engine::StatementExecutionError;
use crate::signature::CallableKind;
use crate::store::StoreError;
use crate::types::CypherType;

/// A single parser diagnostic with its 1-based position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
	pub line: usize,
	pub column: usize,
	pub message: String,
}

impl fmt::Display for Diagnostic {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "line {}:{} {}", self.line, self.column, self.message)
	}
}

/// The signature text does not follow the grammar. Carries every diagnostic
/// the parser produced, not only the first.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
	"syntax error(s) in signature definition {signature}. \nNote that procedure/function name, possible map keys, input and output names must have at least 2 character:\n{}",
	join_diagnostics(.diagnostics)
)]
pub struct SignatureSyntaxError {
	pub signature: String,
	pub diagnostics: Vec<Diagnostic>,
}

fn join_diagnostics(diagnostics: &[Diagnostic]) -> String {
	diagnostics
		.iter()
		.map(Diagnostic::to_string)
		.collect::<Vec<_>>()
		.join("\n")
}

/// A default literal that cannot be used for its parameter. These are logged
/// and the default is dropped; they never fail an install.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidDefaultValue {
	#[error("parameter '{param}' of type {ty} cannot declare a default value")]
	Forbidden { param: String, ty: CypherType },

	#[error("default value {literal} for parameter '{param}' does not match type {ty}")]
	Mismatch {
		param: String,
		ty: CypherType,
		literal: String,
	},
}

/// The host dispatch table refused a signature.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
	#[error("{kind} '{name}' collides with a callable provided by the host")]
	Collision { kind: CallableKind, name: String },

	#[error("host rejected {kind} '{name}': {reason}")]
	Rejected {
		kind: CallableKind,
		name: String,
		reason: String,
	},
}

impl RegistrationError {
	pub fn collision(kind: CallableKind, name: impl Into<String>) -> Self {
		Self::Collision {
			kind,
			name: name.into(),
		}
	}
}

/// Failures of a single invocation. None of these affect the registry.
#[derive(Error, Debug, Clone)]
pub enum InvocationError {
	#[error(
		"There is no procedure with the name `{name}` registered for this database instance. Please ensure you've spelled the procedure name correctly and that the procedure is properly deployed."
	)]
	NotFound { name: String },

	#[error("Unknown function '{name}'")]
	UnknownFunction { name: String },

	#[error("{kind} '{name}' is not registered")]
	UnknownCallable { kind: CallableKind, name: String },

	#[error("statement execution failed: {0}")]
	StatementExecution(#[from] StatementExecutionError),

	#[error("result mismatch: columns {columns:?} cannot be returned as {output}")]
	InvalidResultShape {
		columns: Vec<String>,
		output: CypherType,
	},

	#[error("'{callable}' requires a value for parameter '{parameter}'")]
	MissingArgument { callable: String, parameter: String },

	#[error("'{callable}' accepts {expected} argument(s) but {actual} were given")]
	TooManyArguments {
		callable: String,
		expected: usize,
		actual: usize,
	},

	#[error("invalid input: {0}")]
	InvalidInput(String),
}

impl InvocationError {
	pub fn not_found(name: impl Into<String>) -> Self {
		Self::NotFound { name: name.into() }
	}

	pub fn unknown_function(name: impl Into<String>) -> Self {
		Self::UnknownFunction { name: name.into() }
	}

	/// True for the errors raised by tombstoned callables.
	pub fn is_missing_callable(&self) -> bool {
		matches!(
			self,
			Self::NotFound { .. } | Self::UnknownFunction { .. } | Self::UnknownCallable { .. }
		)
	}
}

/// Errors surfaced by the install/drop/list operations.
#[derive(Error, Debug)]
pub enum CallableError {
	#[error(transparent)]
	Syntax(#[from] SignatureSyntaxError),

	#[error(transparent)]
	Registration(#[from] RegistrationError),

	#[error("metadata store error: {0}")]
	Store(#[from] StoreError),

	#[error(
		"invalid mode '{0}'. Supported modes are [READ, WRITE, SCHEMA, ADMIN]"
	)]
	InvalidMode(String),

	#[error("invalid callable name '{0}'")]
	InvalidName(String),
}
