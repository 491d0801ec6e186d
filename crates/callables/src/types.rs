// Type algebra for callable signatures
//
// Canonical type vocabulary with a string form that reparses to an equal type.
// Nullability markers (`?`) are accepted and discarded.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A canonical signature type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CypherType {
	Any,
	Map,
	Node,
	Relationship,
	Path,
	Number,
	Integer,
	Float,
	Boolean,
	String,
	Date,
	Time,
	LocalTime,
	DateTime,
	LocalDateTime,
	Duration,
	Point,
	Geometry,
	List(Box<CypherType>),
}

/// Outcome of resolving a single base type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
	Known(CypherType),
	/// The name is not part of the vocabulary; STRING is used in its place.
	Fallback(CypherType),
}

impl Resolved {
	pub fn into_type(self) -> CypherType {
		match self {
			Resolved::Known(t) | Resolved::Fallback(t) => t,
		}
	}
}

/// Type-name spelling of a function output that returns a map column as-is.
pub const MAP_RESULT: &str = "MAPRESULT";

impl CypherType {
	pub fn list_of(inner: CypherType) -> Self {
		CypherType::List(Box::new(inner))
	}

	/// Resolve a base (non-list) type name, including the accepted aliases.
	pub fn resolve_base(name: &str) -> Resolved {
		let name = normalize(name);
		let t = match name.as_str() {
			"ANY" => CypherType::Any,
			"MAP" | MAP_RESULT => CypherType::Map,
			"NODE" => CypherType::Node,
			"REL" | "RELATIONSHIP" | "EDGE" => CypherType::Relationship,
			"PATH" => CypherType::Path,
			"NUMBER" => CypherType::Number,
			"LONG" | "INT" | "INTEGER" => CypherType::Integer,
			"FLOAT" | "DOUBLE" => CypherType::Float,
			"BOOL" | "BOOLEAN" => CypherType::Boolean,
			"STRING" => CypherType::String,
			"DATE" => CypherType::Date,
			"TIME" | "ZONED TIME" => CypherType::Time,
			"LOCALTIME" | "LOCAL TIME" => CypherType::LocalTime,
			"DATETIME" | "ZONED DATETIME" => CypherType::DateTime,
			"LOCALDATETIME" | "LOCAL DATETIME" => CypherType::LocalDateTime,
			"DURATION" => CypherType::Duration,
			"POINT" => CypherType::Point,
			"GEO" | "GEOMETRY" => CypherType::Geometry,
			_ => return Resolved::Fallback(CypherType::String),
		};
		Resolved::Known(t)
	}

	/// Resolve a full type name such as `LIST OF INTEGER?` or `LIST<MAP>`.
	pub fn resolve(name: &str) -> Resolved {
		let name = normalize(name);
		if let Some(inner) = name.strip_prefix("LIST OF ") {
			return list_resolved(Self::resolve(inner));
		}
		if let Some(inner) = name
			.strip_prefix("LIST<")
			.and_then(|rest| rest.strip_suffix('>'))
		{
			return list_resolved(Self::resolve(inner));
		}
		if let Some(inner) = name.strip_prefix("LIST ") {
			return list_resolved(Self::resolve(inner));
		}
		if name == "LIST" {
			return Resolved::Known(CypherType::list_of(CypherType::Any));
		}
		Self::resolve_base(&name)
	}

	/// Composite values cannot be written as literals in a signature.
	pub fn accepts_literal_default(&self) -> bool {
		match self {
			CypherType::Node
			| CypherType::Relationship
			| CypherType::Path
			| CypherType::Date
			| CypherType::Time
			| CypherType::LocalTime
			| CypherType::DateTime
			| CypherType::LocalDateTime
			| CypherType::Duration
			| CypherType::Point
			| CypherType::Geometry => false,
			CypherType::List(inner) => inner.accepts_literal_default(),
			_ => true,
		}
	}

	pub fn is_list(&self) -> bool {
		matches!(self, CypherType::List(_))
	}

	/// Lowercase form used when listing installed callables.
	pub fn pretty(&self) -> String {
		self.to_string().to_lowercase()
	}

	fn base_name(&self) -> &'static str {
		match self {
			CypherType::Any => "ANY",
			CypherType::Map => "MAP",
			CypherType::Node => "NODE",
			CypherType::Relationship => "RELATIONSHIP",
			CypherType::Path => "PATH",
			CypherType::Number => "NUMBER",
			CypherType::Integer => "INTEGER",
			CypherType::Float => "FLOAT",
			CypherType::Boolean => "BOOLEAN",
			CypherType::String => "STRING",
			CypherType::Date => "DATE",
			CypherType::Time => "TIME",
			CypherType::LocalTime => "LOCALTIME",
			CypherType::DateTime => "DATETIME",
			CypherType::LocalDateTime => "LOCALDATETIME",
			CypherType::Duration => "DURATION",
			CypherType::Point => "POINT",
			CypherType::Geometry => "GEOMETRY",
			CypherType::List(_) => "LIST",
		}
	}
}

fn list_resolved(inner: Resolved) -> Resolved {
	match inner {
		Resolved::Known(t) => Resolved::Known(CypherType::list_of(t)),
		Resolved::Fallback(t) => Resolved::Fallback(CypherType::list_of(t)),
	}
}

/// Uppercase, drop nullability markers and collapse inner whitespace.
fn normalize(name: &str) -> String {
	name
		.replace('?', "")
		.split_whitespace()
		.collect::<Vec<_>>()
		.join(" ")
		.to_uppercase()
		.replace(" <", "<")
		.replace("< ", "<")
		.replace(" >", ">")
}

impl fmt::Display for CypherType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CypherType::List(inner) => write!(f, "LIST OF {inner}"),
			other => f.write_str(other.base_name()),
		}
	}
}

/// Error for type names outside the vocabulary when parsed strictly.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown type name '{0}'")]
pub struct UnknownType(pub String);

impl FromStr for CypherType {
	type Err = UnknownType;

	/// Strict parse: unknown names are an error rather than STRING.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match CypherType::resolve(s) {
			Resolved::Known(t) => Ok(t),
			Resolved::Fallback(_) => Err(UnknownType(s.to_string())),
		}
	}
}

impl Serialize for CypherType {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for CypherType {
	/// Stored types go through the lenient path so that records written by
	/// older versions with unknown names still load.
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		Ok(CypherType::resolve(&s).into_type())
	}
}
