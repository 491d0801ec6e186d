// Signature compiler
//
// Turns the textual signature grammar into immutable procedure and function
// signatures. Parsing is pure; the only side effect is logging the leniencies
// (unknown type names, unusable default literals).

mod defaults;
mod parser;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub use defaults::{Literal, default_for};

use crate::error::{CallableError, SignatureSyntaxError};
use crate::types::CypherType;
use crate::value::Value;

pub const DEFAULT_ROOT: &str = "custom";

/// Name of the single bulk parameter-map input.
pub const BULK_PARAMS: &str = "params";

/// Name of the single default procedure output.
pub const DEFAULT_OUTPUT: &str = "row";

/// Fully qualified callable name. The root segment is part of `namespace`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
	pub namespace: Vec<String>,
	pub name: String,
}

impl QualifiedName {
	pub fn new(namespace: Vec<String>, name: impl Into<String>) -> Self {
		Self {
			namespace,
			name: name.into(),
		}
	}

	/// Resolve a dotted name as given to drop operations, prepending `root`.
	pub fn from_dotted(root: &str, dotted: &str) -> Result<Self, CallableError> {
		let mut segments: Vec<String> = dotted.split('.').map(str::to_string).collect();
		if segments.iter().any(|s| s.trim().is_empty()) {
			return Err(CallableError::InvalidName(dotted.to_string()));
		}
		let name = segments.pop().unwrap_or_default();
		let mut namespace = Vec::with_capacity(segments.len() + 1);
		namespace.push(root.to_string());
		namespace.extend(segments);
		Ok(Self { namespace, name })
	}

	/// The name without its root segment, as operators wrote it.
	pub fn local_name(&self) -> String {
		let mut parts: Vec<&str> = self.namespace.iter().skip(1).map(String::as_str).collect();
		parts.push(&self.name);
		parts.join(".")
	}
}

impl fmt::Display for QualifiedName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for segment in &self.namespace {
			write!(f, "{segment}.")?;
		}
		f.write_str(&self.name)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallableKind {
	Procedure,
	Function,
}

impl CallableKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			CallableKind::Procedure => "procedure",
			CallableKind::Function => "function",
		}
	}
}

impl fmt::Display for CallableKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Access mode a procedure runs with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
	#[default]
	Read,
	Write,
	Schema,
	Admin,
}

impl FromStr for Mode {
	type Err = CallableError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"read" => Ok(Mode::Read),
			"write" => Ok(Mode::Write),
			"schema" => Ok(Mode::Schema),
			"admin" | "dbms" => Ok(Mode::Admin),
			_ => Err(CallableError::InvalidMode(s.to_string())),
		}
	}
}

impl fmt::Display for Mode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Mode::Read => "read",
			Mode::Write => "write",
			Mode::Schema => "schema",
			Mode::Admin => "admin",
		})
	}
}

/// A named, typed input or output field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSignature {
	pub name: String,
	#[serde(rename = "type")]
	pub ty: CypherType,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub default: Option<Value>,
}

impl FieldSignature {
	pub fn new(name: impl Into<String>, ty: CypherType) -> Self {
		Self {
			name: name.into(),
			ty,
			default: None,
		}
	}

	pub fn with_default(mut self, default: Value) -> Self {
		self.default = Some(default);
		self
	}
}

/// True when the inputs are exactly the bulk `params :: MAP` field.
pub fn is_bulk_input(inputs: &[FieldSignature]) -> bool {
	matches!(inputs, [only] if only.name == BULK_PARAMS && only.ty == CypherType::Map)
}

/// True when the outputs are exactly the default `row :: MAP` field.
pub fn is_default_output(outputs: &[FieldSignature]) -> bool {
	matches!(outputs, [only] if only.name == DEFAULT_OUTPUT && only.ty == CypherType::Map)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureSignature {
	pub name: QualifiedName,
	pub inputs: Vec<FieldSignature>,
	/// Empty for `VOID` procedures.
	pub outputs: Vec<FieldSignature>,
	pub mode: Mode,
	pub description: Option<String>,
}

impl ProcedureSignature {
	pub fn is_void(&self) -> bool {
		self.outputs.is_empty()
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
	pub name: QualifiedName,
	pub inputs: Vec<FieldSignature>,
	pub output: CypherType,
	pub force_single: bool,
	/// Declared as `MAPRESULT`: a single map column is returned unwrapped.
	pub map_result: bool,
	pub description: Option<String>,
}

/// A compiled signature of either kind.
#[derive(Debug, Clone, PartialEq)]
pub enum CallableSignature {
	Procedure(Arc<ProcedureSignature>),
	Function(Arc<FunctionSignature>),
}

impl CallableSignature {
	pub fn kind(&self) -> CallableKind {
		match self {
			CallableSignature::Procedure(_) => CallableKind::Procedure,
			CallableSignature::Function(_) => CallableKind::Function,
		}
	}

	pub fn name(&self) -> &QualifiedName {
		match self {
			CallableSignature::Procedure(p) => &p.name,
			CallableSignature::Function(f) => &f.name,
		}
	}

	pub fn inputs(&self) -> &[FieldSignature] {
		match self {
			CallableSignature::Procedure(p) => &p.inputs,
			CallableSignature::Function(f) => &f.inputs,
		}
	}

	pub fn description(&self) -> Option<&str> {
		match self {
			CallableSignature::Procedure(p) => p.description.as_deref(),
			CallableSignature::Function(f) => f.description.as_deref(),
		}
	}
}

impl fmt::Display for CallableSignature {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}(", self.name())?;
		write_fields(f, self.inputs())?;
		f.write_str(") :: ")?;
		match self {
			CallableSignature::Procedure(p) if p.is_void() => f.write_str("VOID"),
			CallableSignature::Procedure(p) => {
				f.write_str("(")?;
				write_fields(f, &p.outputs)?;
				f.write_str(")")
			},
			CallableSignature::Function(func) => write!(f, "{}", func.output),
		}
	}
}

fn write_fields(f: &mut fmt::Formatter<'_>, fields: &[FieldSignature]) -> fmt::Result {
	for (i, field) in fields.iter().enumerate() {
		if i > 0 {
			f.write_str(", ")?;
		}
		write!(f, "{} :: {}", field.name, field.ty)?;
		if let Some(default) = &field.default {
			write!(f, " = {}", serde_json::to_string(default).map_err(|_| fmt::Error)?)?;
		}
	}
	Ok(())
}

/// Compiles signature text under a fixed root namespace.
#[derive(Debug, Clone)]
pub struct SignatureCompiler {
	root: String,
}

impl Default for SignatureCompiler {
	fn default() -> Self {
		Self::new(DEFAULT_ROOT)
	}
}

impl SignatureCompiler {
	pub fn new(root: impl Into<String>) -> Self {
		Self { root: root.into() }
	}

	pub fn root(&self) -> &str {
		&self.root
	}

	pub fn compile_procedure(
		&self,
		text: &str,
		mode: Mode,
		description: Option<String>,
	) -> Result<ProcedureSignature, SignatureSyntaxError> {
		let parsed = parser::parse(text, parser::Target::Procedure)?;
		let name = self.qualify(parsed.namespace, parsed.name);
		let inputs = resolve_fields(&name, parsed.inputs, text);
		let outputs = match parsed.tail {
			parser::Tail::Outputs(outputs) => resolve_fields(&name, outputs, text),
			parser::Tail::Void => Vec::new(),
			parser::Tail::Type(_) => Vec::new(),
		};
		Ok(ProcedureSignature {
			name,
			inputs,
			outputs,
			mode,
			description,
		})
	}

	pub fn compile_function(
		&self,
		text: &str,
		force_single: bool,
		description: Option<String>,
	) -> Result<FunctionSignature, SignatureSyntaxError> {
		let parsed = parser::parse(text, parser::Target::Function)?;
		let name = self.qualify(parsed.namespace, parsed.name);
		let inputs = resolve_fields(&name, parsed.inputs, text);
		let (output, map_result) = match parsed.tail {
			parser::Tail::Type(ty) => {
				let map_result = ty.map_result;
				(ty.into_type(&name, text), map_result)
			},
			parser::Tail::Outputs(_) | parser::Tail::Void => (CypherType::Any, false),
		};
		Ok(FunctionSignature {
			name,
			inputs,
			output,
			force_single,
			map_result,
			description,
		})
	}

	fn qualify(&self, declared: Vec<String>, name: String) -> QualifiedName {
		let mut namespace = Vec::with_capacity(declared.len() + 1);
		namespace.push(self.root.clone());
		namespace.extend(declared);
		QualifiedName { namespace, name }
	}
}

fn resolve_fields(
	callable: &QualifiedName,
	fields: Vec<parser::ParsedField>,
	text: &str,
) -> Vec<FieldSignature> {
	fields
		.into_iter()
		.map(|field| {
			let ty = field.ty.into_type(callable, text);
			let default = field.default.and_then(|literal| {
				default_for(&field.name, &ty, &literal)
					.map_err(|e| {
						warn!(
							target: "custom_callables",
							callable = %callable,
							error = %e,
							"ignoring default value"
						);
					})
					.ok()
			});
			FieldSignature {
				name: field.name,
				ty,
				default,
			}
		})
		.collect()
}
