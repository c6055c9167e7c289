use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::RwLock;

use crate::event::{Event, Snapshot};

/// Owns the only mutable shared state in the service: the current snapshot.
/// Readers take a consistent `Arc`'d view, writers publish a whole new
/// snapshot in one swap. The lock is never held across network IO.
pub struct CacheStore {
	snapshot: RwLock<Arc<Snapshot>>,
}

impl CacheStore {
	pub fn new() -> Self {
		Self { snapshot: RwLock::new(Arc::new(Snapshot::empty())) }
	}

	pub async fn read(&self) -> Arc<Snapshot> {
		self.snapshot.read().await.clone()
	}

	pub async fn replace(&self, events: Vec<Event>) {
		let snapshot = Arc::new(Snapshot {
			events,
			last_updated: Some(Utc::now()),
		});
		*self.snapshot.write().await = snapshot;
	}

	/// True when nothing has ever been committed, or the last commit is
	/// older than `max_age`.
	pub async fn is_stale(&self, max_age: Duration) -> bool {
		match self.snapshot.read().await.last_updated {
			Some(at) => Utc::now() - at > max_age,
			None => true,
		}
	}
}

impl Default for CacheStore {
	fn default() -> Self {
		Self::new()
	}
}
