//! JSON file snapshot store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::config::WebwxConfig;
use crate::store::{PersistedSnapshot, SnapshotStore, StoreResult};

/// Stores the snapshot as pretty-printed JSON at a fixed path.
#[derive(Debug, Clone)]
pub struct JsonFileSnapshotStore {
    path: PathBuf,
}

impl JsonFileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Use the snapshot path from the configuration.
    pub fn from_config(config: &WebwxConfig) -> Self {
        Self::new(&config.snapshot_path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SnapshotStore for JsonFileSnapshotStore {
    async fn save(&self, snapshot: &PersistedSnapshot) -> StoreResult<()> {
        let serialized = serde_json::to_vec_pretty(snapshot)?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }

        // Write beside the target, then rename over it.
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, serialized).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        log::debug!("snapshot written to {}", self.path.display());
        Ok(())
    }

    async fn load(&self) -> StoreResult<PersistedSnapshot> {
        let contents = tokio::fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::snapshot::sample_snapshot;
    use crate::store::StoreError;

    #[tokio::test]
    async fn test_file_store_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSnapshotStore::new(dir.path().join("nested/session.json"));

        let snapshot = sample_snapshot();
        store.save(&snapshot).await.unwrap();
        assert_eq!(store.load().await.unwrap(), snapshot);
        assert!(!store.path().with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSnapshotStore::new(dir.path().join("absent.json"));
        assert_eq!(store.load().await.unwrap_err(), StoreError::NotFound);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, b"{not json").unwrap();
        let store = JsonFileSnapshotStore::new(path);
        assert!(matches!(
            store.load().await.unwrap_err(),
            StoreError::Serialization(_)
        ));
    }

    #[test]
    fn test_from_config() {
        let config = WebwxConfig::default().with_snapshot_path("/tmp/x.json");
        assert_eq!(
            JsonFileSnapshotStore::from_config(&config).path(),
            Path::new("/tmp/x.json")
        );
    }
}
