// Invocation adapter
//
// Binds positional arguments to the backing statement's named parameters,
// runs it through the query engine and shapes the rows into procedure
// records or a single function value.

use std::sync::Arc;

use futures::stream::{StreamExt, TryStreamExt};
use tracing::error;

use super::dispatch::{CallOutput, CallableHandler, RecordStream};
use crate::engine::{QueryEngine, QueryResult, StatementExecutionError};
use crate::error::InvocationError;
use crate::signature::{
	CallableSignature, DEFAULT_OUTPUT, FieldSignature, FunctionSignature, ProcedureSignature,
	is_bulk_input, is_default_output,
};
use crate::types::CypherType;
use crate::value::{Params, Row, Value};

/// Handler backed by a statement. Without a statement it is a tombstone that
/// reports the callable as missing.
pub struct StatementHandler {
	signature: CallableSignature,
	statement: Option<Arc<str>>,
	engine: Arc<dyn QueryEngine>,
	scope: Arc<str>,
}

impl StatementHandler {
	pub fn new(
		signature: CallableSignature,
		statement: Option<String>,
		engine: Arc<dyn QueryEngine>,
		scope: impl Into<Arc<str>>,
	) -> Self {
		Self {
			signature,
			statement: statement.map(Arc::from),
			engine,
			scope: scope.into(),
		}
	}

	fn missing(&self) -> InvocationError {
		let name = self.signature.name().to_string();
		match self.signature {
			CallableSignature::Procedure(_) => InvocationError::not_found(name),
			CallableSignature::Function(_) => InvocationError::unknown_function(name),
		}
	}
}

#[async_trait::async_trait]
impl CallableHandler for StatementHandler {
	fn signature(&self) -> &CallableSignature {
		&self.signature
	}

	async fn invoke(&self, args: Vec<Value>) -> Result<CallOutput, InvocationError> {
		let Some(statement) = self.statement.clone() else {
			return Err(self.missing());
		};
		let params = bind_params(&self.signature.name().to_string(), self.signature.inputs(), args)?;
		let failure = FailureLog {
			signature: self.signature.to_string(),
			statement: Arc::clone(&statement),
		};
		let result = self
			.engine
			.execute(&statement, params, &self.scope)
			.await
			.map_err(|e| failure.execution(e))?;
		match &self.signature {
			CallableSignature::Procedure(sig) => Ok(CallOutput::Records(procedure_records(
				Arc::clone(sig),
				result,
				failure,
			))),
			CallableSignature::Function(sig) => {
				let QueryResult { columns, mut rows } = result;
				let rows = if reads_all_rows(sig) {
					rows.try_collect::<Vec<Row>>().await
				} else {
					rows.try_next().await.map(|first| first.into_iter().collect())
				}
				.map_err(|e| failure.execution(e))?;
				function_value(sig, &columns, rows).map(CallOutput::Value)
			},
		}
	}
}

/// Context logged when a statement fails, since the failure surfaces far
/// from the install that introduced it.
#[derive(Clone)]
struct FailureLog {
	signature: String,
	statement: Arc<str>,
}

impl FailureLog {
	fn execution(&self, e: StatementExecutionError) -> InvocationError {
		error!(
			target: "custom_callables",
			signature = %self.signature,
			statement = %self.statement,
			error = %e,
			"statement execution failed"
		);
		InvocationError::StatementExecution(e)
	}
}

/// Map positional arguments onto named parameters.
pub fn bind_params(
	callable: &str,
	inputs: &[FieldSignature],
	args: Vec<Value>,
) -> Result<Params, InvocationError> {
	if args.len() > inputs.len() {
		return Err(InvocationError::TooManyArguments {
			callable: callable.to_string(),
			expected: inputs.len(),
			actual: args.len(),
		});
	}
	if is_bulk_input(inputs) {
		return match args.into_iter().next() {
			Some(Value::Map(map)) => Ok(convert_row(map)),
			Some(Value::Null) | None => Ok(match &inputs[0].default {
				Some(Value::Map(map)) => map.clone(),
				_ => Params::new(),
			}),
			Some(other) => Err(InvocationError::InvalidInput(format!(
				"'{callable}' expects a map of parameters but got {}",
				other.kind_name()
			))),
		};
	}
	let mut args = args.into_iter();
	let mut params = Params::with_capacity(inputs.len());
	for field in inputs {
		let value = match args.next() {
			Some(value) => value.convert_recursive(),
			None => field
				.default
				.clone()
				.ok_or_else(|| InvocationError::MissingArgument {
					callable: callable.to_string(),
					parameter: field.name.clone(),
				})?,
		};
		params.insert(field.name.clone(), value);
	}
	Ok(params)
}

fn procedure_records(
	signature: Arc<ProcedureSignature>,
	result: QueryResult,
	failure: FailureLog,
) -> RecordStream {
	let rows = result.rows.map_err(move |e| failure.execution(e));
	if signature.is_void() {
		// drained when the caller polls, never yields
		return rows
			.try_filter_map(|_| async { Ok(None::<Row>) })
			.boxed();
	}
	if is_default_output(&signature.outputs) {
		return rows
			.map_ok(|row| {
				let mut record = Row::with_capacity(1);
				record.insert(DEFAULT_OUTPUT.to_string(), Value::Map(convert_row(row)));
				record
			})
			.boxed();
	}
	rows
		.map_ok(move |row| {
			signature
				.outputs
				.iter()
				.map(|field| {
					let value = row
						.get(&field.name)
						.map(Value::convert_recursive)
						.unwrap_or_default();
					(field.name.clone(), value)
				})
				.collect()
		})
		.boxed()
}

fn convert_row(row: Row) -> Row {
	row
		.into_iter()
		.map(|(k, v)| (k, v.convert_recursive()))
		.collect()
}

fn column(row: &Row, name: &str) -> Value {
	row.get(name).map(Value::convert_recursive).unwrap_or_default()
}

/// Only ANY and list outputs look past the first row; everything else stops
/// reading after it.
fn reads_all_rows(signature: &FunctionSignature) -> bool {
	signature.output == CypherType::Any || (!signature.force_single && signature.output.is_list())
}

/// Shape the rows of a function's statement into its single return value.
pub fn function_value(
	signature: &FunctionSignature,
	columns: &[String],
	rows: Vec<Row>,
) -> Result<Value, InvocationError> {
	let Some(first) = rows.first() else {
		return Ok(Value::Null);
	};
	if signature.output == CypherType::Any {
		return Ok(Value::List(rows.into_iter().map(|r| Value::Map(convert_row(r))).collect()));
	}
	if columns.is_empty() {
		return Ok(Value::Null);
	}
	if !signature.force_single {
		if let CypherType::List(inner) = &signature.output {
			if **inner == CypherType::Map && !signature.map_result {
				return Ok(Value::List(rows.into_iter().map(|r| Value::Map(convert_row(r))).collect()));
			}
			if let [only] = columns {
				return Ok(Value::List(rows.iter().map(|r| column(r, only)).collect()));
			}
		}
	}
	if signature.output == CypherType::Map && !signature.map_result {
		return Ok(Value::Map(convert_row(first.clone())));
	}
	if let [only] = columns {
		return Ok(column(first, only));
	}
	Err(InvocationError::InvalidResultShape {
		columns: columns.to_vec(),
		output: signature.output.clone(),
	})
}

/// Rows of a finished stream, for callers that want them all at once.
pub async fn collect_records(records: RecordStream) -> Result<Vec<Row>, InvocationError> {
	records.try_collect().await
}
