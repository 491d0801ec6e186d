// Refresh scheduler
//
// Each instance polls the scope's refresh marker and, when it moved past the
// last applied value, reconciles its registry with the stored records. This
// is the only way an instance learns about changes made elsewhere.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::CallableRegistry;
use crate::store::{MetadataStore, StoreError};

/// Outcome of a reconcile pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
	pub marker: i64,
	pub registered: usize,
	pub removed: usize,
	pub failed: usize,
}

struct Poll {
	cancel: CancellationToken,
	handle: JoinHandle<()>,
}

pub struct RefreshScheduler {
	registry: Arc<CallableRegistry>,
	store: Arc<dyn MetadataStore>,
	interval: Duration,
	last_applied: AtomicI64,
	/// Serializes reconcile passes with local install and drop.
	reconcile_lock: AsyncMutex<()>,
	poll: Mutex<Option<Poll>>,
}

impl RefreshScheduler {
	pub fn new(
		registry: Arc<CallableRegistry>,
		store: Arc<dyn MetadataStore>,
		interval: Duration,
	) -> Self {
		Self {
			registry,
			store,
			interval,
			last_applied: AtomicI64::new(0),
			reconcile_lock: AsyncMutex::new(()),
			poll: Mutex::new(None),
		}
	}

	pub fn interval(&self) -> Duration {
		self.interval
	}

	/// Marker value the registry currently reflects.
	pub fn last_applied(&self) -> i64 {
		self.last_applied.load(Ordering::Acquire)
	}

	pub fn is_polling(&self) -> bool {
		self.poll.lock().is_some()
	}

	/// Hold off reconcile passes while the caller mutates the registry.
	pub async fn lock(&self) -> MutexGuard<'_, ()> {
		self.reconcile_lock.lock().await
	}

	/// Load every stored record of the scope, then start polling.
	pub async fn become_available(self: &Arc<Self>) -> Result<ReconcileSummary, StoreError> {
		let summary = self.reconcile().await?;
		let cancel = CancellationToken::new();
		let handle = tokio::spawn(Arc::clone(self).run(cancel.clone()));
		if let Some(previous) = self.poll.lock().replace(Poll { cancel, handle }) {
			previous.cancel.cancel();
		}
		info!(
			target: "custom_callables",
			scope = %self.registry.scope(),
			interval = ?self.interval,
			callables = summary.registered,
			"refresh polling started"
		);
		Ok(summary)
	}

	/// Stop polling and unbind everything this instance registered.
	pub fn become_unavailable(&self) {
		if let Some(poll) = self.poll.lock().take() {
			poll.cancel.cancel();
			poll.handle.abort();
		}
		self.registry.clear();
		self.last_applied.store(0, Ordering::Release);
		info!(target: "custom_callables", scope = %self.registry.scope(), "refresh polling stopped");
	}

	async fn run(self: Arc<Self>, cancel: CancellationToken) {
		loop {
			tokio::select! {
				_ = cancel.cancelled() => break,
				_ = tokio::time::sleep(self.interval) => {},
			}
			if let Err(e) = self.tick().await {
				warn!(
					target: "custom_callables",
					scope = %self.registry.scope(),
					"refresh failed: {}",
					e
				);
			}
		}
	}

	/// One poll: reconcile if the store changed since the last pass.
	/// Returns the summary when a reconcile ran.
	pub async fn tick(&self) -> Result<Option<ReconcileSummary>, StoreError> {
		let marker = self.store.last_updated(self.registry.scope()).await?;
		if marker <= self.last_applied() {
			return Ok(None);
		}
		debug!(
			target: "custom_callables",
			scope = %self.registry.scope(),
			marker,
			last_applied = self.last_applied(),
			"store changed, reconciling"
		);
		self.reconcile().await.map(Some)
	}

	/// Make the registry match the stored records of the scope.
	pub async fn reconcile(&self) -> Result<ReconcileSummary, StoreError> {
		let _guard = self.reconcile_lock.lock().await;
		let scope = self.registry.scope();
		// read first so a write racing with this pass shows up on the next tick
		let marker = self.store.last_updated(scope).await?;
		let records = self.store.list(scope).await?;

		let previous = self.registry.live_names();
		let mut current = HashSet::with_capacity(records.len());
		let mut summary = ReconcileSummary {
			marker,
			..Default::default()
		};
		for record in records {
			let signature = record.signature();
			current.insert((signature.kind(), signature.name().clone()));
			match self.registry.register(signature, Some(record.statement)) {
				Ok(()) => summary.registered += 1,
				Err(e) => {
					summary.failed += 1;
					warn!(target: "custom_callables", scope, error = %e, "failed to register stored callable");
				},
			}
		}
		for (kind, name) in previous.difference(&current) {
			match self.registry.tombstone(*kind, name) {
				Ok(()) => summary.removed += 1,
				Err(e) => warn!(target: "custom_callables", scope, error = %e, "failed to remove callable"),
			}
		}
		self.registry.engine().clear_plan_cache(scope);
		self.last_applied.store(marker, Ordering::Release);
		debug!(
			target: "custom_callables",
			scope,
			marker,
			registered = summary.registered,
			removed = summary.removed,
			"reconciled"
		);
		Ok(summary)
	}
}
