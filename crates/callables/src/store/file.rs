// File-backed metadata store
//
// The whole catalog is one JSON document. Mutations are read-modify-write
// under an exclusive advisory lock on a sibling `.lock` file, which every
// handle and process sharing the path contends on. Each write goes to a
// uniquely named temp file in the same directory and is renamed over the
// document, so readers never see a partial write.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{Catalog, MetadataStore, StoreError, StoredRecord};
use crate::signature::{CallableKind, QualifiedName};

#[derive(Debug)]
pub struct FileMetadataStore {
	path: PathBuf,
	// one writer per handle on the blocking pool
	lock: Mutex<()>,
}

impl FileMetadataStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			lock: Mutex::new(()),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	async fn load(&self) -> Result<Catalog, StoreError> {
		match fs_err::tokio::read_to_string(&self.path).await {
			Ok(content) => parse_catalog(&self.path, &content),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Catalog::default()),
			Err(e) => Err(e.into()),
		}
	}

	/// Apply `f` to the catalog and persist it if it reports a change.
	async fn mutate<T, F>(&self, f: F) -> Result<T, StoreError>
	where
		T: Send + 'static,
		F: FnOnce(&mut Catalog) -> (T, bool) + Send + 'static,
	{
		let _guard = self.lock.lock().await;
		let path = self.path.clone();
		tokio::task::spawn_blocking(move || mutate_locked(&path, f))
			.await
			.map_err(|e| StoreError::Storage(format!("metadata writer failed: {e}")))?
	}
}

fn parse_catalog(path: &Path, content: &str) -> Result<Catalog, StoreError> {
	if content.trim().is_empty() {
		return Ok(Catalog::default());
	}
	serde_json::from_str(content)
		.map_err(|e| StoreError::Serialization(format!("{}: {e}", path.display())))
}

fn parent_dir(path: &Path) -> &Path {
	path
		.parent()
		.filter(|p| !p.as_os_str().is_empty())
		.unwrap_or(Path::new("."))
}

fn lock_path(path: &Path) -> PathBuf {
	let mut lock = path.to_path_buf().into_os_string();
	lock.push(".lock");
	PathBuf::from(lock)
}

fn mutate_locked<T>(
	path: &Path,
	f: impl FnOnce(&mut Catalog) -> (T, bool),
) -> Result<T, StoreError> {
	let dir = parent_dir(path);
	fs_err::create_dir_all(dir)?;
	let (lock_file, _) = fs_err::OpenOptions::new()
		.create(true)
		.truncate(false)
		.read(true)
		.write(true)
		.open(lock_path(path))?
		.into_parts();
	let mut lock = fd_lock::RwLock::new(lock_file);
	let _held = lock.write()?;

	let mut catalog = match fs_err::read_to_string(path) {
		Ok(content) => parse_catalog(path, &content)?,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Catalog::default(),
		Err(e) => return Err(e.into()),
	};
	let (out, changed) = f(&mut catalog);
	if changed {
		save(path, dir, &catalog)?;
	}
	Ok(out)
}

fn save(path: &Path, dir: &Path, catalog: &Catalog) -> Result<(), StoreError> {
	let body =
		serde_json::to_vec_pretty(catalog).map_err(|e| StoreError::Serialization(e.to_string()))?;
	let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
	tmp.write_all(&body)?;
	tmp.as_file().sync_all()?;
	tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
	debug!(target: "custom_callables", path = %path.display(), "metadata written");
	Ok(())
}

#[async_trait]
impl MetadataStore for FileMetadataStore {
	async fn install(&self, record: StoredRecord) -> Result<(), StoreError> {
		self
			.mutate(move |catalog| {
				catalog.install(record);
				((), true)
			})
			.await
	}

	async fn drop_one(
		&self,
		scope: &str,
		name: &QualifiedName,
		kind: CallableKind,
	) -> Result<Option<StoredRecord>, StoreError> {
		let (scope, name) = (scope.to_string(), name.clone());
		self
			.mutate(move |catalog| {
				let removed = catalog.drop_one(&scope, &name, kind);
				let changed = removed.is_some();
				(removed, changed)
			})
			.await
	}

	async fn drop_all(&self, scope: &str) -> Result<Vec<StoredRecord>, StoreError> {
		let scope = scope.to_string();
		self
			.mutate(move |catalog| {
				let removed = catalog.drop_all(&scope);
				let changed = !removed.is_empty();
				(removed, changed)
			})
			.await
	}

	async fn list(&self, scope: &str) -> Result<Vec<StoredRecord>, StoreError> {
		Ok(self.load().await?.list(scope))
	}

	async fn last_updated(&self, scope: &str) -> Result<i64, StoreError> {
		Ok(self.load().await?.last_updated(scope))
	}
}
