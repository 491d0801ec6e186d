// Default-value literals and their validation against declared types

use std::fmt;

use indexmap::IndexMap;
use itertools::Itertools;

use crate::error::InvalidDefaultValue;
use crate::types::CypherType;
use crate::value::Value;

/// A default literal as written in a signature. Numbers keep their source
/// text so STRING parameters can use it verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
	Null,
	Boolean(bool),
	Integer { value: i64, raw: String },
	Float { value: f64, raw: String },
	Quoted(String),
	/// Unquoted text that is not a number, boolean or null.
	Plain(String),
	List(Vec<Literal>),
	Map(Vec<(String, Literal)>),
}

impl Literal {
	/// Classify an unquoted token.
	pub(crate) fn from_token(token: &str) -> Literal {
		if token.eq_ignore_ascii_case("null") {
			return Literal::Null;
		}
		if token.eq_ignore_ascii_case("true") {
			return Literal::Boolean(true);
		}
		if token.eq_ignore_ascii_case("false") {
			return Literal::Boolean(false);
		}
		if looks_numeric(token) {
			if let Ok(value) = token.parse::<i64>() {
				return Literal::Integer {
					value,
					raw: token.to_string(),
				};
			}
			if let Ok(value) = token.parse::<f64>() {
				return Literal::Float {
					value,
					raw: token.to_string(),
				};
			}
		}
		Literal::Plain(token.to_string())
	}

	/// Untyped conversion, used for ANY and for the contents of maps.
	pub fn to_value(&self) -> Value {
		match self {
			Literal::Null => Value::Null,
			Literal::Boolean(b) => Value::Boolean(*b),
			Literal::Integer { value, .. } => Value::Integer(*value),
			Literal::Float { value, .. } => Value::Float(*value),
			Literal::Quoted(s) | Literal::Plain(s) => Value::String(s.clone()),
			Literal::List(items) => Value::List(items.iter().map(Literal::to_value).collect()),
			Literal::Map(entries) => Value::Map(
				entries
					.iter()
					.map(|(k, v)| (k.clone(), v.to_value()))
					.collect::<IndexMap<_, _>>(),
			),
		}
	}

	fn scalar_text(&self) -> Option<String> {
		match self {
			Literal::Boolean(b) => Some(b.to_string()),
			Literal::Integer { raw, .. } | Literal::Float { raw, .. } => Some(raw.clone()),
			Literal::Quoted(s) | Literal::Plain(s) => Some(s.clone()),
			_ => None,
		}
	}
}

fn looks_numeric(token: &str) -> bool {
	let digits = token.strip_prefix(['-', '+']).unwrap_or(token);
	digits
		.chars()
		.next()
		.is_some_and(|c| c.is_ascii_digit() || c == '.')
}

impl fmt::Display for Literal {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Literal::Null => f.write_str("null"),
			Literal::Boolean(b) => write!(f, "{b}"),
			Literal::Integer { raw, .. } | Literal::Float { raw, .. } => f.write_str(raw),
			Literal::Quoted(s) => write!(f, "'{s}'"),
			Literal::Plain(s) => f.write_str(s),
			Literal::List(items) => write!(f, "[{}]", items.iter().join(", ")),
			Literal::Map(entries) => write!(
				f,
				"{{{}}}",
				entries.iter().map(|(k, v)| format!("{k}: {v}")).join(", ")
			),
		}
	}
}

/// Validate `literal` as the default of parameter `param` of type `ty`.
/// `null` is accepted for every type.
pub fn default_for(
	param: &str,
	ty: &CypherType,
	literal: &Literal,
) -> Result<Value, InvalidDefaultValue> {
	if matches!(literal, Literal::Null) {
		return Ok(Value::Null);
	}
	if !ty.accepts_literal_default() {
		return Err(InvalidDefaultValue::Forbidden {
			param: param.to_string(),
			ty: ty.clone(),
		});
	}
	coerce(ty, literal).ok_or_else(|| InvalidDefaultValue::Mismatch {
		param: param.to_string(),
		ty: ty.clone(),
		literal: literal.to_string(),
	})
}

fn coerce(ty: &CypherType, literal: &Literal) -> Option<Value> {
	match (ty, literal) {
		(_, Literal::Null) => Some(Value::Null),
		(CypherType::Any, lit) => Some(lit.to_value()),
		(CypherType::String, lit) => lit.scalar_text().map(Value::String),
		(CypherType::Integer, Literal::Integer { value, .. }) => Some(Value::Integer(*value)),
		(CypherType::Integer, Literal::Quoted(s) | Literal::Plain(s)) => {
			s.trim().parse().ok().map(Value::Integer)
		},
		(CypherType::Float, Literal::Integer { value, .. }) => Some(Value::Float(*value as f64)),
		(CypherType::Float, Literal::Float { value, .. }) => Some(Value::Float(*value)),
		(CypherType::Float, Literal::Quoted(s) | Literal::Plain(s)) => {
			s.trim().parse().ok().map(Value::Float)
		},
		(CypherType::Number, Literal::Integer { value, .. }) => Some(Value::Integer(*value)),
		(CypherType::Number, Literal::Float { value, .. }) => Some(Value::Float(*value)),
		(CypherType::Boolean, Literal::Boolean(b)) => Some(Value::Boolean(*b)),
		(CypherType::Boolean, Literal::Quoted(s) | Literal::Plain(s)) => {
			match s.trim().to_ascii_lowercase().as_str() {
				"true" => Some(Value::Boolean(true)),
				"false" => Some(Value::Boolean(false)),
				_ => None,
			}
		},
		(CypherType::Map, lit @ Literal::Map(_)) => Some(lit.to_value()),
		(CypherType::List(inner), Literal::List(items)) => items
			.iter()
			.map(|item| coerce(inner, item))
			.collect::<Option<Vec<_>>>()
			.map(Value::List),
		_ => None,
	}
}
