//! Backend-agnostic persisted key-value storage.
//!
//! The session store only ever touches three keys, so the interface is a
//! minimal async get/set/remove. Two backends: in-memory (tests) and a
//! JSON file (durable across process restarts).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StoreError;

/// Durable key-value storage for session credentials.
#[async_trait]
pub trait KvStorage: Send + Sync {
    /// Read a value, `None` if the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a key. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory storage. Ephemeral — used in tests and previews.
#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl KvStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// File-backed storage — a single JSON object on disk.
///
/// The whole map is rewritten on every mutation. Fine for three small
/// keys; mutations are serialized by the write lock.
pub struct FileStorage {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl FileStorage {
    /// Open (or create) the backing file and load existing entries.
    pub async fn open(path: impl AsRef<Path>) -> Result<Arc<Self>, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let entries = match fs::read_to_string(&path).await {
            Ok(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw)?,
            Ok(_) => HashMap::new(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), keys = entries.len(), "Opened session storage");
        Ok(Arc::new(Self {
            path,
            entries: RwLock::new(entries),
        }))
    }

    /// Persist the current map. Caller must hold the write lock.
    async fn flush(&self, entries: &HashMap<String, String>) -> Result<(), StoreError> {
        let raw = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, raw).await?;
        Ok(())
    }
}

#[async_trait]
impl KvStorage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        self.flush(&entries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_roundtrip() {
        let storage = MemoryStorage::new();
        assert!(storage.get("k").await.unwrap().is_none());

        storage.set("k", "v").await.unwrap();
        assert_eq!(storage.get("k").await.unwrap().as_deref(), Some("v"));

        storage.remove("k").await.unwrap();
        assert!(storage.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_storage_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        {
            let storage = FileStorage::open(&path).await.unwrap();
            storage.set("auth.access_token", "tok-1").await.unwrap();
            storage.set("auth.expires_at", "12345").await.unwrap();
        }

        let reopened = FileStorage::open(&path).await.unwrap();
        assert_eq!(
            reopened.get("auth.access_token").await.unwrap().as_deref(),
            Some("tok-1")
        );
        assert_eq!(
            reopened.get("auth.expires_at").await.unwrap().as_deref(),
            Some("12345")
        );
    }

    #[tokio::test]
    async fn file_storage_remove_is_durable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let storage = FileStorage::open(&path).await.unwrap();
        storage.set("k", "v").await.unwrap();
        storage.remove("k").await.unwrap();

        let reopened = FileStorage::open(&path).await.unwrap();
        assert!(reopened.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_storage_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("fresh.json"))
            .await
            .unwrap();
        assert!(storage.get("anything").await.unwrap().is_none());
    }
}
