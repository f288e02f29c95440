//! In-memory snapshot store for development and testing.
//!
//! For restarts across processes use [`JsonFileSnapshotStore`](crate::store::JsonFileSnapshotStore).

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::store::{PersistedSnapshot, SnapshotStore, StoreError, StoreResult};

/// Keeps the last saved snapshot in memory.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshot: RwLock<Option<PersistedSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `snapshot` already stored.
    pub fn with_snapshot(snapshot: PersistedSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(Some(snapshot)),
        }
    }

    pub fn current(&self) -> Option<PersistedSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, snapshot: &PersistedSnapshot) -> StoreResult<()> {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        Ok(())
    }

    async fn load(&self) -> StoreResult<PersistedSnapshot> {
        self.current().ok_or(StoreError::NotFound)
    }
}
