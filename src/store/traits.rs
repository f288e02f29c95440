//! Persistence contract for warm restarts.
//!
//! A snapshot store is a capability: it can load and save one
//! [`PersistedSnapshot`]. Where the bytes go is up to the implementation.

use async_trait::async_trait;

use crate::store::PersistedSnapshot;

/// Error type for snapshot store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("no snapshot stored")]
    NotFound,
    #[error("snapshot storage error: {0}")]
    Io(String),
    #[error("snapshot serialization error: {0}")]
    Serialization(String),
    #[error("snapshot rejected: {0}")]
    Invalid(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound,
            _ => StoreError::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Load/save capability for session snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist `snapshot`, replacing whatever was stored before.
    async fn save(&self, snapshot: &PersistedSnapshot) -> StoreResult<()>;

    /// Read the stored snapshot. [`StoreError::NotFound`] when nothing was
    /// ever saved.
    async fn load(&self) -> StoreResult<PersistedSnapshot>;
}
