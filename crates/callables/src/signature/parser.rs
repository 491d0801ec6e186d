// Signature grammar parser
//
//   signature  := qualified '(' fields? ')' '::' tail
//   qualified  := name ('.' name)*
//   input      := name '::' type ('=' literal)? | name '=' literal '::' type
//   output     := name '::' type
//   proc tail  := '(' output (',' output)* ')' | VOID
//   func tail  := type
//
// Field lists recover at ',' and ')' so one pass reports every broken field.

use tracing::warn;

use super::defaults::Literal;
use crate::error::{Diagnostic, SignatureSyntaxError};
use crate::signature::QualifiedName;
use crate::types::{CypherType, MAP_RESULT, Resolved};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
	Procedure,
	Function,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
	Input,
	Output,
}

#[derive(Debug)]
pub(crate) struct ParsedSignature {
	pub namespace: Vec<String>,
	pub name: String,
	pub inputs: Vec<ParsedField>,
	pub tail: Tail,
}

#[derive(Debug)]
pub(crate) enum Tail {
	Outputs(Vec<ParsedField>),
	Void,
	Type(ParsedType),
}

#[derive(Debug)]
pub(crate) struct ParsedField {
	pub name: String,
	pub ty: ParsedType,
	pub default: Option<Literal>,
}

/// A type as written, normalized to the `LIST OF` spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedType {
	pub text: String,
	pub map_result: bool,
}

impl ParsedType {
	pub fn into_type(self, callable: &QualifiedName, signature: &str) -> CypherType {
		match CypherType::resolve(&self.text) {
			Resolved::Known(t) => t,
			Resolved::Fallback(t) => {
				warn!(
					target: "custom_callables",
					callable = %callable,
					signature,
					type_name = %self.text,
					"unknown type name, using {t}"
				);
				t
			},
		}
	}
}

pub(crate) fn parse(text: &str, target: Target) -> Result<ParsedSignature, SignatureSyntaxError> {
	let mut parser = Parser::new(text);
	let parsed = parser.signature(target);
	match parsed {
		Some(parsed) if parser.diagnostics.is_empty() => Ok(parsed),
		_ => Err(SignatureSyntaxError {
			signature: text.to_string(),
			diagnostics: parser.diagnostics,
		}),
	}
}

type PResult<T> = Result<T, Diagnostic>;

#[derive(Debug, Clone, Copy)]
struct Mark {
	pos: usize,
	line: usize,
	column: usize,
}

struct Parser {
	input: Vec<char>,
	pos: usize,
	line: usize,
	column: usize,
	diagnostics: Vec<Diagnostic>,
}

impl Parser {
	fn new(input: &str) -> Self {
		Self {
			input: input.chars().collect(),
			pos: 0,
			line: 1,
			column: 1,
			diagnostics: Vec::new(),
		}
	}

	fn signature(&mut self, target: Target) -> Option<ParsedSignature> {
		self.skip_ws();
		let (namespace, name) = self.report(Self::qualified_name)?;
		self.skip_ws();
		self.report(|p| p.expect('('))?;
		let inputs = self.report(|p| p.field_list(Role::Input))?;
		self.skip_ws();
		self.report(Self::expect_double_colon)?;
		self.skip_ws();
		let tail = match target {
			Target::Procedure => self.report(Self::procedure_tail)?,
			Target::Function => Tail::Type(self.report(Self::type_expr)?),
		};
		self.skip_ws();
		if let Some(c) = self.peek() {
			let d = self.error(format!("unexpected '{c}' after the end of the signature"));
			self.diagnostics.push(d);
		}
		Some(ParsedSignature {
			namespace,
			name,
			inputs,
			tail,
		})
	}

	/// Run a step, moving a hard error into the diagnostics.
	fn report<T>(&mut self, step: impl FnOnce(&mut Self) -> PResult<T>) -> Option<T> {
		match step(self) {
			Ok(v) => Some(v),
			Err(d) => {
				self.diagnostics.push(d);
				None
			},
		}
	}

	fn qualified_name(&mut self) -> PResult<(Vec<String>, String)> {
		let mut segments = vec![self.name()?];
		while self.try_consume('.') {
			segments.push(self.name()?);
		}
		let name = segments.pop().unwrap_or_default();
		Ok((segments, name))
	}

	/// Parse fields up to and including the closing ')'. Broken fields are
	/// reported and skipped; only a missing ')' is a hard error.
	fn field_list(&mut self, role: Role) -> PResult<Vec<ParsedField>> {
		let mut fields = Vec::new();
		self.skip_ws();
		if self.try_consume(')') {
			return Ok(fields);
		}
		loop {
			self.skip_ws();
			match self.field(role) {
				Ok(field) => fields.push(field),
				Err(d) => {
					self.diagnostics.push(d);
					self.recover();
				},
			}
			self.skip_ws();
			match self.peek() {
				Some(',') => {
					self.advance();
				},
				Some(')') => {
					self.advance();
					return Ok(fields);
				},
				Some(c) => {
					let d = self.error(format!("expected ',' or ')' but found '{c}'"));
					self.diagnostics.push(d);
					self.recover();
					if self.try_consume(')') {
						return Ok(fields);
					}
					self.try_consume(',');
				},
				None => return Err(self.error("unexpected end of signature, expected ')'")),
			}
			if self.at_end() {
				return Err(self.error("unexpected end of signature, expected ')'"));
			}
		}
	}

	fn field(&mut self, role: Role) -> PResult<ParsedField> {
		let name = self.name()?;
		self.skip_ws();
		if role == Role::Input && self.try_consume('=') {
			self.skip_ws();
			let default = self.literal()?;
			self.skip_ws();
			self.expect_double_colon()?;
			self.skip_ws();
			let ty = self.type_expr()?;
			return Ok(ParsedField {
				name,
				ty,
				default: Some(default),
			});
		}
		self.expect_double_colon()?;
		self.skip_ws();
		let ty = self.type_expr()?;
		self.skip_ws();
		let default = if self.try_consume('=') {
			if role == Role::Output {
				return Err(self.error("output fields cannot declare a default value"));
			}
			self.skip_ws();
			Some(self.literal()?)
		} else {
			None
		};
		Ok(ParsedField { name, ty, default })
	}

	fn procedure_tail(&mut self) -> PResult<Tail> {
		if self.try_consume('(') {
			let outputs = self.field_list(Role::Output)?;
			if outputs.is_empty() {
				let d = self.error("procedure output list is empty, use VOID for no outputs");
				self.diagnostics.push(d);
			}
			return Ok(Tail::Outputs(outputs));
		}
		let start = self.mark();
		let word = self.word()?;
		if word.eq_ignore_ascii_case("VOID") {
			Ok(Tail::Void)
		} else {
			Err(self.error_at(
				start,
				format!("expected '(' or VOID for procedure output but found '{word}'"),
			))
		}
	}

	fn type_expr(&mut self) -> PResult<ParsedType> {
		let word = self.word()?.to_ascii_uppercase();
		self.try_consume('?');
		if word == "LIST" {
			return self.list_tail();
		}
		let mut text = word;
		if text == "LOCAL" || text == "ZONED" {
			let mark = self.mark();
			self.skip_ws();
			match self.peek_word() {
				Some(next) if matches!(next.to_ascii_uppercase().as_str(), "TIME" | "DATETIME") => {
					let next = self.word()?.to_ascii_uppercase();
					text = format!("{text} {next}");
				},
				_ => self.reset(mark),
			}
		}
		self.try_consume('?');
		let map_result = text == MAP_RESULT;
		Ok(ParsedType { text, map_result })
	}

	fn list_tail(&mut self) -> PResult<ParsedType> {
		let mark = self.mark();
		self.skip_ws();
		let inner = if self.try_consume('<') {
			self.skip_ws();
			let inner = self.type_expr()?;
			self.skip_ws();
			self.expect('>')?;
			self.try_consume('?');
			Some(inner)
		} else {
			match self.peek_word() {
				Some(w) if w.eq_ignore_ascii_case("OF") => {
					self.word()?;
					self.skip_ws();
					Some(self.type_expr()?)
				},
				Some(_) => Some(self.type_expr()?),
				None => {
					self.reset(mark);
					None
				},
			}
		};
		Ok(match inner {
			Some(inner) => ParsedType {
				text: format!("LIST OF {}", inner.text),
				map_result: inner.map_result,
			},
			None => ParsedType {
				text: "LIST".to_string(),
				map_result: false,
			},
		})
	}

	fn literal(&mut self) -> PResult<Literal> {
		match self.peek() {
			Some(q @ ('\'' | '"')) => self.quoted(q).map(Literal::Quoted),
			Some('[') => self.list_literal(),
			Some('{') => self.map_literal(),
			Some(c) if is_plain(c) => {
				let mut token = String::new();
				while let Some(c) = self.peek().filter(|c| is_plain(*c)) {
					token.push(c);
					self.advance();
				}
				Ok(Literal::from_token(&token))
			},
			Some(c) => Err(self.error(format!("expected a default value but found '{c}'"))),
			None => Err(self.error("unexpected end of signature, expected a default value")),
		}
	}

	fn list_literal(&mut self) -> PResult<Literal> {
		self.expect('[')?;
		let mut items = Vec::new();
		self.skip_ws();
		if self.try_consume(']') {
			return Ok(Literal::List(items));
		}
		loop {
			self.skip_ws();
			items.push(self.literal()?);
			self.skip_ws();
			if self.try_consume(']') {
				return Ok(Literal::List(items));
			}
			self.expect(',')?;
		}
	}

	fn map_literal(&mut self) -> PResult<Literal> {
		self.expect('{')?;
		let mut entries = Vec::new();
		self.skip_ws();
		if self.try_consume('}') {
			return Ok(Literal::Map(entries));
		}
		loop {
			self.skip_ws();
			let key = match self.peek() {
				Some(q @ ('\'' | '"')) => self.quoted(q)?,
				_ => self.name()?,
			};
			self.skip_ws();
			self.expect(':')?;
			self.skip_ws();
			entries.push((key, self.literal()?));
			self.skip_ws();
			if self.try_consume('}') {
				return Ok(Literal::Map(entries));
			}
			self.expect(',')?;
		}
	}

	fn quoted(&mut self, quote: char) -> PResult<String> {
		let start = self.mark();
		self.advance();
		let mut out = String::new();
		loop {
			match self.advance() {
				Some('\\') => match self.advance() {
					Some('n') => out.push('\n'),
					Some('t') => out.push('\t'),
					Some('r') => out.push('\r'),
					Some(c) => out.push(c),
					None => break,
				},
				Some(c) if c == quote => return Ok(out),
				Some(c) => out.push(c),
				None => break,
			}
		}
		Err(self.error_at(start, "unterminated string literal"))
	}

	/// Identifier or backtick-quoted name. Short names are reported but parsing
	/// continues so later problems are found too.
	fn name(&mut self) -> PResult<String> {
		let start = self.mark();
		let name = match self.peek() {
			Some('`') => {
				self.advance();
				let mut name = String::new();
				loop {
					match self.advance() {
						Some('`') => break,
						Some(c) => name.push(c),
						None => return Err(self.error_at(start, "unterminated quoted name")),
					}
				}
				name
			},
			Some(c) if c.is_alphabetic() || c == '_' => self.word()?,
			Some(c) => return Err(self.error(format!("expected a name but found '{c}'"))),
			None => return Err(self.error("unexpected end of signature, expected a name")),
		};
		if name.chars().count() < 2 {
			let d = self.error_at(start, format!("name '{name}' must have at least 2 characters"));
			self.diagnostics.push(d);
		}
		Ok(name)
	}

	fn word(&mut self) -> PResult<String> {
		let mut word = String::new();
		while let Some(c) = self.peek().filter(|c| c.is_alphanumeric() || *c == '_') {
			word.push(c);
			self.advance();
		}
		if word.is_empty() {
			return Err(match self.peek() {
				Some(c) => self.error(format!("expected a type but found '{c}'")),
				None => self.error("unexpected end of signature, expected a type"),
			});
		}
		Ok(word)
	}

	fn peek_word(&self) -> Option<String> {
		let word: String = self.input[self.pos..]
			.iter()
			.take_while(|c| c.is_alphanumeric() || **c == '_')
			.collect();
		(!word.is_empty()).then_some(word)
	}

	fn expect_double_colon(&mut self) -> PResult<()> {
		let start = self.mark();
		if self.try_consume(':') && self.try_consume(':') {
			return Ok(());
		}
		self.reset(start);
		Err(match self.peek() {
			Some(c) => self.error(format!("expected '::' but found '{c}'")),
			None => self.error("unexpected end of signature, expected '::'"),
		})
	}

	/// Skip to the next ',' or ')' at nesting depth zero.
	fn recover(&mut self) {
		let mut depth = 0usize;
		while let Some(c) = self.peek() {
			match c {
				',' | ')' if depth == 0 => return,
				'(' | '[' | '{' => depth += 1,
				')' | ']' | '}' => depth = depth.saturating_sub(1),
				'\'' | '"' => {
					if self.quoted(c).is_err() {
						return;
					}
					continue;
				},
				_ => {},
			}
			self.advance();
		}
	}

	fn at_end(&self) -> bool {
		self.pos >= self.input.len()
	}

	fn peek(&self) -> Option<char> {
		self.input.get(self.pos).copied()
	}

	fn advance(&mut self) -> Option<char> {
		let c = self.peek()?;
		self.pos += 1;
		if c == '\n' {
			self.line += 1;
			self.column = 1;
		} else {
			self.column += 1;
		}
		Some(c)
	}

	fn try_consume(&mut self, c: char) -> bool {
		if self.peek() == Some(c) {
			self.advance();
			true
		} else {
			false
		}
	}

	fn expect(&mut self, c: char) -> PResult<()> {
		if self.try_consume(c) {
			return Ok(());
		}
		Err(match self.peek() {
			Some(found) => self.error(format!("expected '{c}' but found '{found}'")),
			None => self.error(format!("unexpected end of signature, expected '{c}'")),
		})
	}

	fn skip_ws(&mut self) {
		while self.peek().is_some_and(char::is_whitespace) {
			self.advance();
		}
	}

	fn mark(&self) -> Mark {
		Mark {
			pos: self.pos,
			line: self.line,
			column: self.column,
		}
	}

	fn reset(&mut self, mark: Mark) {
		self.pos = mark.pos;
		self.line = mark.line;
		self.column = mark.column;
	}

	fn error(&self, message: impl Into<String>) -> Diagnostic {
		self.error_at(self.mark(), message)
	}

	fn error_at(&self, mark: Mark, message: impl Into<String>) -> Diagnostic {
		Diagnostic {
			line: mark.line,
			column: mark.column,
			message: message.into(),
		}
	}
}

fn is_plain(c: char) -> bool {
	!c.is_whitespace() && !matches!(c, ',' | ')' | '(' | ']' | '[' | '{' | '}' | ':' | '\'' | '"')
}
