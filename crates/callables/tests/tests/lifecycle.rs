//! Install, drop and convergence across instances sharing one metadata store.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use callables::error::InvocationError;
use callables::testing::{FailingStore, ScriptedEngine};
use callables::value::row;
use callables::{
	CallableError, CallableKind, FileMetadataStore, InMemoryDispatchTable, InstallFunction,
	InstallProcedure, MemoryMetadataStore, MetadataStore, RegistrationError, StoreError, Value,
};

use crate::common::Instance;

const ANSWER: &str = "RETURN 42 AS answer";

fn answering() -> ScriptedEngine {
	ScriptedEngine::new().respond(ANSWER, ["answer"], vec![row([("answer", 42i64)])])
}

#[tokio::test]
async fn test_drop_converges_across_instances() -> anyhow::Result<()> {
	let store: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
	let a = Instance::new("neo4j", store.clone(), answering());
	let b = Instance::new("neo4j", store.clone(), answering());
	a.callables.start().await?;
	b.callables.start().await?;

	a.callables
		.install_function("answer() :: INT", ANSWER, InstallFunction::default())
		.await?;
	assert_eq!(a.table.call_function("custom.answer", vec![]).await?, Value::Integer(42));

	b.callables.refresh().await?;
	assert_eq!(b.table.call_function("custom.answer", vec![]).await?, Value::Integer(42));

	assert!(a.callables.drop_function("answer", None).await?);
	assert_matches!(
		a.table.call_function("custom.answer", vec![]).await,
		Err(InvocationError::UnknownFunction { name }) if name == "custom.answer"
	);

	b.callables.refresh().await?;
	assert_matches!(
		b.table.call_function("custom.answer", vec![]).await,
		Err(InvocationError::UnknownFunction { .. })
	);
	assert!(b.callables.list(None).await?.is_empty());

	a.callables.stop();
	b.callables.stop();
	Ok(())
}

#[tokio::test]
async fn test_dropped_procedure_reports_not_found() -> anyhow::Result<()> {
	let store: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
	let a = Instance::new("neo4j", store.clone(), ScriptedEngine::new());
	let b = Instance::new("neo4j", store.clone(), ScriptedEngine::new());

	a.callables
		.install_procedure(
			"cleanup() :: VOID",
			"MATCH (n:Temp) DETACH DELETE n",
			InstallProcedure {
				mode: Some("WRITE".to_string()),
				..Default::default()
			},
		)
		.await?;
	b.callables.refresh().await?;
	assert!(b.table.call_procedure("custom.cleanup", vec![]).await.is_ok());

	a.callables.drop_procedure("cleanup", None).await?;
	b.callables.refresh().await?;
	let err = b
		.table
		.call_procedure("custom.cleanup", vec![])
		.await
		.err()
		.expect("dropped procedure must fail");
	assert_matches!(&err, InvocationError::NotFound { name } if name == "custom.cleanup");
	assert!(err.to_string().starts_with(
		"There is no procedure with the name `custom.cleanup` registered for this database instance."
	));
	Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_polling_converges_without_explicit_refresh() -> anyhow::Result<()> {
	let store: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
	let a = Instance::new("neo4j", store.clone(), answering());
	let b = Instance::new("neo4j", store.clone(), answering());
	b.callables.start().await?;

	a.callables
		.install_function("answer() :: INT", ANSWER, InstallFunction::default())
		.await?;
	assert!(b.table.is_empty());

	tokio::time::sleep(Duration::from_millis(150)).await;
	assert_eq!(b.table.call_function("custom.answer", vec![]).await?, Value::Integer(42));
	assert!(b.engine.plan_cache_clears() >= 2);

	b.callables.stop();
	assert!(b.table.is_empty());
	Ok(())
}

#[tokio::test]
async fn test_start_loads_existing_callables() -> anyhow::Result<()> {
	let store: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
	let a = Instance::new("neo4j", store.clone(), answering());
	a.callables
		.install_function("answer() :: INT", ANSWER, InstallFunction::default())
		.await?;

	let b = Instance::new("neo4j", store.clone(), answering());
	let summary = b.callables.start().await?;
	assert_eq!(summary.registered, 1);
	assert_eq!(b.callables.scheduler().last_applied(), store.last_updated("neo4j").await?);
	assert_eq!(b.table.call_function("custom.answer", vec![]).await?, Value::Integer(42));
	b.callables.stop();
	Ok(())
}

#[tokio::test]
async fn test_scopes_are_isolated() -> anyhow::Result<()> {
	let store: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
	let a = Instance::new("neo4j", store.clone(), answering());
	let b = Instance::new("other", store.clone(), answering());

	a.callables
		.install_function(
			"answer() :: INT",
			ANSWER,
			InstallFunction {
				scope: Some("other".to_string()),
				..Default::default()
			},
		)
		.await?;
	// installing into a scope this instance does not serve only writes the store
	assert!(a.table.is_empty());
	assert!(a.callables.list(None).await?.is_empty());
	assert_eq!(a.callables.list(Some("other")).await?.len(), 1);

	b.callables.refresh().await?;
	assert_eq!(b.table.call_function("custom.answer", vec![]).await?, Value::Integer(42));

	a.callables.refresh().await?;
	assert!(a.table.is_empty());
	Ok(())
}

#[tokio::test]
async fn test_reinstall_is_idempotent() -> anyhow::Result<()> {
	let store: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
	let a = Instance::new("neo4j", store.clone(), answering());
	for _ in 0..2 {
		a.callables
			.install_function("answer() :: INT", ANSWER, InstallFunction::default())
			.await?;
	}
	assert_eq!(a.callables.list(None).await?.len(), 1);
	assert_eq!(a.table.len(), 1);

	a.callables
		.install_function("answer() :: STRING", "RETURN 'yes' AS answer", InstallFunction::default())
		.await?;
	let listed = a.callables.list(None).await?;
	assert_eq!(listed.len(), 1);
	assert_eq!(listed[0].statement, "RETURN 'yes' AS answer");
	Ok(())
}

#[tokio::test]
async fn test_drop_all_returns_sorted_records() -> anyhow::Result<()> {
	let store: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
	let a = Instance::new("neo4j", store.clone(), ScriptedEngine::new());
	a.callables
		.install_procedure("zz.proc() :: VOID", "RETURN 1", InstallProcedure::default())
		.await?;
	a.callables
		.install_procedure("aa.same() :: VOID", "RETURN 1", InstallProcedure::default())
		.await?;
	a.callables
		.install_function("aa.same() :: INT", "RETURN 1", InstallFunction::default())
		.await?;

	let removed = a.callables.drop_all(None).await?;
	let names: Vec<_> = removed.iter().map(|c| (c.name.as_str(), c.kind)).collect();
	assert_eq!(
		names,
		vec![
			("aa.same", CallableKind::Function),
			("aa.same", CallableKind::Procedure),
			("zz.proc", CallableKind::Procedure),
		]
	);
	assert!(a.callables.list(None).await?.is_empty());
	assert!(a.callables.registry().live_names().is_empty());
	assert_matches!(
		a.table.call_procedure("custom.zz.proc", vec![]).await.err(),
		Some(InvocationError::NotFound { .. })
	);
	assert!(a.callables.drop_all(None).await?.is_empty());
	Ok(())
}

#[tokio::test]
async fn test_drop_missing_returns_false() -> anyhow::Result<()> {
	let store: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
	let a = Instance::new("neo4j", store.clone(), ScriptedEngine::new());
	assert!(!a.callables.drop_procedure("nothing.here", None).await?);
	assert!(!a.callables.drop_function("nothing.here", None).await?);
	assert_eq!(store.last_updated("neo4j").await?, 0);
	assert_matches!(
		a.callables.drop_function("bad..name", None).await,
		Err(CallableError::InvalidName(_))
	);
	Ok(())
}

#[tokio::test]
async fn test_collision_is_not_stored() -> anyhow::Result<()> {
	let store: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
	let table = InMemoryDispatchTable::new().with_reserved(CallableKind::Function, "custom.answer");
	let a = Instance::with_table("neo4j", store.clone(), answering(), table);

	let result = a
		.callables
		.install_function("answer() :: INT", ANSWER, InstallFunction::default())
		.await;
	assert_matches!(
		result,
		Err(CallableError::Registration(RegistrationError::Collision { .. }))
	);
	assert!(a.callables.list(None).await?.is_empty());
	Ok(())
}

#[tokio::test]
async fn test_rejects_bad_input() -> anyhow::Result<()> {
	let store: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
	let a = Instance::new("neo4j", store.clone(), ScriptedEngine::new());

	assert_matches!(
		a.callables
			.install_procedure(
				"ok.proc() :: VOID",
				"RETURN 1",
				InstallProcedure {
					mode: Some("sideways".to_string()),
					..Default::default()
				},
			)
			.await,
		Err(CallableError::InvalidMode(mode)) if mode == "sideways"
	);
	assert_matches!(
		a.callables
			.install_function("broken(:: INT", "RETURN 1", InstallFunction::default())
			.await,
		Err(CallableError::Syntax(_))
	);
	assert!(a.callables.list(None).await?.is_empty());
	Ok(())
}

#[tokio::test]
async fn test_file_store_shared_between_instances() -> anyhow::Result<()> {
	let dir = tempfile::tempdir()?;
	let path = dir.path().join("callables.json");
	let a = Instance::new("neo4j", Arc::new(FileMetadataStore::new(&path)), answering());
	let b = Instance::new("neo4j", Arc::new(FileMetadataStore::new(&path)), answering());

	a.callables
		.install_function(
			"answer() :: INT",
			ANSWER,
			InstallFunction {
				description: Some("the answer".to_string()),
				..Default::default()
			},
		)
		.await?;
	assert!(path.exists());

	b.callables.start().await?;
	assert_eq!(b.table.call_function("custom.answer", vec![]).await?, Value::Integer(42));
	let listed = b.callables.list(None).await?;
	assert_eq!(listed[0].description.as_deref(), Some("the answer"));

	a.callables.drop_function("answer", None).await?;
	b.callables.refresh().await?;
	assert!(!b.callables.registry().is_live(
		CallableKind::Function,
		&callables::QualifiedName::from_dotted("custom", "answer")?
	));
	b.callables.stop();
	Ok(())
}

#[tokio::test]
async fn test_failed_store_write_leaves_bindings_unchanged() -> anyhow::Result<()> {
	let store = Arc::new(FailingStore::new(Arc::new(MemoryMetadataStore::new())));
	let a = Instance::new("neo4j", store.clone(), answering());
	a.callables.start().await?;
	a.callables
		.install_function("answer() :: INT", ANSWER, InstallFunction::default())
		.await?;
	a.callables.refresh().await?;

	store.fail_writes(true);
	assert_matches!(
		a.callables
			.install_function("other() :: INT", "RETURN 7 AS other", InstallFunction::default())
			.await,
		Err(CallableError::Store(StoreError::Storage(_)))
	);
	assert_matches!(
		a.table.call_function("custom.other", vec![]).await,
		Err(InvocationError::UnknownFunction { .. })
	);
	assert!(!a.callables.registry().is_live(
		CallableKind::Function,
		&callables::QualifiedName::from_dotted("custom", "other")?
	));

	// a failed replacement keeps the old statement bound
	assert_matches!(
		a.callables
			.install_function("answer() :: STRING", "RETURN 'yes' AS answer", InstallFunction::default())
			.await,
		Err(CallableError::Store(_))
	);
	assert_eq!(a.table.call_function("custom.answer", vec![]).await?, Value::Integer(42));

	assert_matches!(a.callables.drop_function("answer", None).await, Err(CallableError::Store(_)));
	assert_matches!(a.callables.drop_all(None).await, Err(CallableError::Store(_)));
	assert_eq!(a.table.call_function("custom.answer", vec![]).await?, Value::Integer(42));

	assert_eq!(a.callables.refresh().await?, None);
	assert_eq!(a.callables.list(None).await?.len(), 1);
	assert_eq!(a.callables.registry().live_names().len(), 1);

	store.fail_writes(false);
	a.callables
		.install_function("other() :: INT", "RETURN 7 AS other", InstallFunction::default())
		.await?;
	assert_eq!(a.callables.list(None).await?.len(), 2);
	a.callables.stop();
	Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_installs_through_shared_file_store() -> anyhow::Result<()> {
	let dir = tempfile::tempdir()?;
	let path = dir.path().join("callables.json");
	let a = Arc::new(Instance::new("neo4j", Arc::new(FileMetadataStore::new(&path)), ScriptedEngine::new()));
	let b = Arc::new(Instance::new("neo4j", Arc::new(FileMetadataStore::new(&path)), ScriptedEngine::new()));

	let mut tasks = Vec::new();
	for (prefix, instance) in [("aa", &a), ("bb", &b)] {
		for i in 0..30 {
			let instance = Arc::clone(instance);
			tasks.push(tokio::spawn(async move {
				instance
					.callables
					.install_function(
						&format!("{prefix}.fn{i}() :: INT"),
						"RETURN 1 AS out",
						InstallFunction::default(),
					)
					.await
			}));
		}
	}
	for task in tasks {
		task.await??;
	}

	assert_eq!(a.callables.list(None).await?.len(), 60);
	b.callables.refresh().await?;
	assert_eq!(b.callables.registry().live_names().len(), 60);
	Ok(())
}
