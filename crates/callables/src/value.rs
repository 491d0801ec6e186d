// Engine values exchanged with the query engine and used for default literals

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::CypherType;

/// A result row: column name -> value, in column order.
pub type Row = IndexMap<String, Value>;

/// Named statement parameters.
pub type Params = IndexMap<String, Value>;

/// A generic value produced or consumed by the query engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
	#[default]
	Null,
	Boolean(bool),
	Integer(i64),
	Float(f64),
	String(String),
	List(Vec<Value>),
	/// Values the engine owns (nodes, relationships, paths, temporal and
	/// spatial values). Declared before `Map` so the tagged JSON form wins.
	Opaque(Arc<Opaque>),
	Map(IndexMap<String, Value>),
}

/// An engine-owned composite value. The core never looks inside `repr`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Opaque {
	#[serde(rename = "@type")]
	pub kind: CypherType,
	#[serde(rename = "@value")]
	pub repr: serde_json::Value,
}

impl Value {
	pub fn opaque(kind: CypherType, repr: serde_json::Value) -> Self {
		Value::Opaque(Arc::new(Opaque { kind, repr }))
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Value::Null)
	}

	pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
		match self {
			Value::Map(m) => Some(m),
			_ => None,
		}
	}

	pub fn as_list(&self) -> Option<&[Value]> {
		match self {
			Value::List(l) => Some(l),
			_ => None,
		}
	}

	/// Short name of the value's shape, for error messages.
	pub fn kind_name(&self) -> &'static str {
		match self {
			Value::Null => "null",
			Value::Boolean(_) => "boolean",
			Value::Integer(_) => "integer",
			Value::Float(_) => "float",
			Value::String(_) => "string",
			Value::List(_) => "list",
			Value::Opaque(_) => "opaque",
			Value::Map(_) => "map",
		}
	}

	/// Rebuild nested lists and maps; opaque values are shared, not copied.
	pub fn convert_recursive(&self) -> Value {
		match self {
			Value::List(items) => Value::List(items.iter().map(Value::convert_recursive).collect()),
			Value::Map(map) => Value::Map(
				map
					.iter()
					.map(|(k, v)| (k.clone(), v.convert_recursive()))
					.collect(),
			),
			Value::Opaque(o) => Value::Opaque(Arc::clone(o)),
			other => other.clone(),
		}
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Value::Null => f.write_str("null"),
			Value::Boolean(b) => write!(f, "{b}"),
			Value::Integer(i) => write!(f, "{i}"),
			Value::Float(x) => write!(f, "{x:?}"),
			Value::String(s) => f.write_str(s),
			Value::List(items) => {
				f.write_str("[")?;
				for (i, v) in items.iter().enumerate() {
					if i > 0 {
						f.write_str(", ")?;
					}
					write!(f, "{v}")?;
				}
				f.write_str("]")
			},
			Value::Opaque(o) => write!(f, "{}({})", o.kind, o.repr),
			Value::Map(map) => {
				f.write_str("{")?;
				for (i, (k, v)) in map.iter().enumerate() {
					if i > 0 {
						f.write_str(", ")?;
					}
					write!(f, "{k}: {v}")?;
				}
				f.write_str("}")
			},
		}
	}
}

impl From<bool> for Value {
	fn from(b: bool) -> Self {
		Value::Boolean(b)
	}
}

impl From<i64> for Value {
	fn from(i: i64) -> Self {
		Value::Integer(i)
	}
}

impl From<f64> for Value {
	fn from(x: f64) -> Self {
		Value::Float(x)
	}
}

impl From<&str> for Value {
	fn from(s: &str) -> Self {
		Value::String(s.to_string())
	}
}

impl From<String> for Value {
	fn from(s: String) -> Self {
		Value::String(s)
	}
}

impl From<Vec<Value>> for Value {
	fn from(items: Vec<Value>) -> Self {
		Value::List(items)
	}
}

impl From<IndexMap<String, Value>> for Value {
	fn from(map: IndexMap<String, Value>) -> Self {
		Value::Map(map)
	}
}

/// Build a [`Row`] from `(column, value)` pairs.
pub fn row<K, V, I>(pairs: I) -> Row
where
	K: Into<String>,
	V: Into<Value>,
	I: IntoIterator<Item = (K, V)>,
{
	pairs
		.into_iter()
		.map(|(k, v)| (k.into(), v.into()))
		.collect()
}
