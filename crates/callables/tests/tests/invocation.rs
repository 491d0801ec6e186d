//! Invoking installed callables through the dispatch table.

use std::sync::Arc;

use assert_matches::assert_matches;
use callables::engine::StatementExecutionError;
use callables::error::InvocationError;
use callables::registry::collect_records;
use callables::testing::ScriptedEngine;
use callables::value::row;
use callables::{InstallFunction, InstallProcedure, MemoryMetadataStore, MetadataStore, Value};
use indexmap::IndexMap;

use crate::common::Instance;

fn instance(engine: ScriptedEngine) -> Instance {
	let store: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
	Instance::new("neo4j", store, engine)
}

#[tokio::test]
async fn test_procedure_projects_declared_outputs() -> anyhow::Result<()> {
	let statement = "MATCH (p:Person) WHERE p.age > $minAge RETURN p.name AS name, p.age AS age, 1 AS extra";
	let engine = ScriptedEngine::new().respond(
		statement,
		["name", "age", "extra"],
		vec![
			row([("name", Value::from("Ada")), ("age", Value::from(36i64)), ("extra", Value::from(1i64))]),
			row([("name", Value::from("Alan")), ("age", Value::from(41i64)), ("extra", Value::from(1i64))]),
		],
	);
	let a = instance(engine);
	a.callables
		.install_procedure(
			"people.older(minAge = 18 :: INT) :: (name :: STRING, age :: INT)",
			statement,
			InstallProcedure::default(),
		)
		.await?;

	let records = collect_records(a.table.call_procedure("custom.people.older", vec![]).await?).await?;
	assert_eq!(records.len(), 2);
	assert_eq!(records[0].keys().collect::<Vec<_>>(), vec!["name", "age"]);
	assert_eq!(records[1]["name"], Value::from("Alan"));

	let executions = a.engine.executions();
	assert_eq!(executions[0].params["minAge"], Value::Integer(18));
	assert_eq!(executions[0].scope, "neo4j");
	Ok(())
}

#[tokio::test]
async fn test_default_output_wraps_rows() -> anyhow::Result<()> {
	let statement = "MATCH (n) RETURN n.id AS id, n.tag AS tag";
	let engine = ScriptedEngine::new().respond(
		statement,
		["id", "tag"],
		vec![row([("id", Value::from(7i64)), ("tag", Value::from("x"))])],
	);
	let a = instance(engine);
	a.callables
		.install_procedure("nodes.all() :: (row :: MAP)", statement, InstallProcedure::default())
		.await?;

	let records = collect_records(a.table.call_procedure("custom.nodes.all", vec![]).await?).await?;
	let expected: IndexMap<String, Value> = row([("id", Value::from(7i64)), ("tag", Value::from("x"))]);
	assert_eq!(records, vec![row([("row", Value::Map(expected))])]);
	Ok(())
}

#[tokio::test]
async fn test_bulk_params_pass_through() -> anyhow::Result<()> {
	let a = instance(ScriptedEngine::new());
	a.callables
		.install_procedure(
			"bulk.run(params :: MAP) :: VOID",
			"CREATE (:Thing {name: $name, size: $size})",
			InstallProcedure {
				mode: Some("write".to_string()),
				..Default::default()
			},
		)
		.await?;

	let args = Value::Map(row([("name", Value::from("box")), ("size", Value::from(3i64))]));
	let records = collect_records(a.table.call_procedure("custom.bulk.run", vec![args]).await?).await?;
	assert!(records.is_empty());
	let executions = a.engine.executions();
	assert_eq!(executions[0].params.keys().collect::<Vec<_>>(), vec!["name", "size"]);

	assert_matches!(
		a.table
			.call_procedure("custom.bulk.run", vec![Value::from("nope")])
			.await
			.err(),
		Some(InvocationError::InvalidInput(_))
	);
	Ok(())
}

#[tokio::test]
async fn test_function_shapes() -> anyhow::Result<()> {
	let engine = ScriptedEngine::new()
		.respond("RETURN 42 AS answer", ["answer"], vec![row([("answer", 42i64)])])
		.respond(
			"UNWIND range(1, 3) AS x RETURN x",
			["x"],
			vec![row([("x", 1i64)]), row([("x", 2i64)]), row([("x", 3i64)])],
		)
		.respond(
			"RETURN 'a' AS first, 'b' AS second",
			["first", "second"],
			vec![row([("first", "a"), ("second", "b")])],
		);
	let a = instance(engine);
	let f = &a.callables;
	f.install_function("answer() :: INT", "RETURN 42 AS answer", InstallFunction::default())
		.await?;
	f.install_function("numbers() :: LIST OF INT", "UNWIND range(1, 3) AS x RETURN x", InstallFunction::default())
		.await?;
	f.install_function(
		"first() :: INT",
		"UNWIND range(1, 3) AS x RETURN x",
		InstallFunction {
			force_single: true,
			..Default::default()
		},
	)
	.await?;
	f.install_function("pair() :: MAP", "RETURN 'a' AS first, 'b' AS second", InstallFunction::default())
		.await?;
	f.install_function("broken() :: INT", "RETURN 'a' AS first, 'b' AS second", InstallFunction::default())
		.await?;

	assert_eq!(a.table.call_function("custom.answer", vec![]).await?, Value::Integer(42));
	assert_eq!(
		a.table.call_function("custom.numbers", vec![]).await?,
		Value::List(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)])
	);
	assert_eq!(a.table.call_function("custom.first", vec![]).await?, Value::Integer(1));
	assert_eq!(
		a.table.call_function("custom.pair", vec![]).await?,
		Value::Map(row([("first", "a"), ("second", "b")]))
	);
	assert_matches!(
		a.table.call_function("custom.broken", vec![]).await,
		Err(InvocationError::InvalidResultShape { columns, .. }) if columns.len() == 2
	);
	Ok(())
}

#[tokio::test]
async fn test_arguments_are_checked() -> anyhow::Result<()> {
	let a = instance(ScriptedEngine::new());
	a.callables
		.install_function("add(left :: INT, right :: INT) :: INT", "RETURN $left + $right", InstallFunction::default())
		.await?;

	assert_matches!(
		a.table.call_function("custom.add", vec![Value::from(1i64)]).await,
		Err(InvocationError::MissingArgument { parameter, .. }) if parameter == "right"
	);
	assert_matches!(
		a.table
			.call_function("custom.add", vec![Value::from(1i64), Value::from(2i64), Value::from(3i64)])
			.await,
		Err(InvocationError::TooManyArguments { expected: 2, actual: 3, .. })
	);
	// no rows means null
	assert_eq!(
		a.table
			.call_function("custom.add", vec![Value::from(1i64), Value::from(2i64)])
			.await?,
		Value::Null
	);
	Ok(())
}

#[tokio::test]
async fn test_statement_failure_surfaces_to_caller() -> anyhow::Result<()> {
	let engine = ScriptedEngine::new().fail(
		"RETURN 1/0 AS boom",
		StatementExecutionError::with_code("Neo.ClientError.Statement.ArithmeticError", "/ by zero"),
	);
	let a = instance(engine);
	a.callables
		.install_function("boom() :: INT", "RETURN 1/0 AS boom", InstallFunction::default())
		.await?;

	let err = a.table.call_function("custom.boom", vec![]).await.unwrap_err();
	assert_matches!(&err, InvocationError::StatementExecution(e) if e.message == "/ by zero");
	// the callable stays installed
	assert!(a.callables.registry().live_names().len() == 1);
	Ok(())
}
