//! services/extension_host/src/adapters/file_store.rs
//!
//! A `LocalStore` persisted as a single JSON object on disk. Every write rewrites
//! the file through a temporary sibling and a rename, so a crash never leaves a
//! half-written document behind.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use synthstyle_core::ports::{LocalStore, PortError, PortResult};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

pub struct FileLocalStore {
    path: PathBuf,
    entries: Mutex<Map<String, Value>>,
}

fn storage_error(path: &Path, e: impl std::fmt::Display) -> PortError {
    PortError::StorageUnavailable(format!("{}: {}", path.display(), e))
}

impl FileLocalStore {
    /// Opens the store, starting empty when the file does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> PortResult<Self> {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Map::new(),
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(map)) => map,
                Ok(_) => return Err(storage_error(&path, "not a JSON object")),
                Err(e) => return Err(storage_error(&path, e)),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(storage_error(&path, e)),
        };
        debug!("Opened {} with {} keys.", path.display(), entries.len());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &Map<String, Value>) -> PortResult<()> {
        let bytes = serde_json::to_vec_pretty(entries).map_err(|e| storage_error(&self.path, e))?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| storage_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| storage_error(&self.path, e))
    }
}

#[async_trait]
impl LocalStore for FileLocalStore {
    async fn get(&self, key: &str) -> PortResult<Option<Value>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: Value) -> PortResult<()> {
        let mut entries = self.entries.lock().await;
        let previous = entries.insert(key.to_string(), value);
        if let Err(e) = self.persist(&entries).await {
            // Keep memory and disk in agreement.
            match previous {
                Some(previous) => entries.insert(key.to_string(), previous),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> PortResult<()> {
        let mut entries = self.entries.lock().await;
        if let Some(previous) = entries.remove(key) {
            if let Err(e) = self.persist(&entries).await {
                entries.insert(key.to_string(), previous);
                return Err(e);
            }
        }
        Ok(())
    }

    async fn clear(&self) -> PortResult<()> {
        let mut entries = self.entries.lock().await;
        let previous = std::mem::take(&mut *entries);
        if let Err(e) = self.persist(&entries).await {
            *entries = previous;
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn values_survive_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");

        let store = FileLocalStore::open(&path).await.unwrap();
        assert_eq!(store.get("userId").await.unwrap(), None);
        store.set("userId", json!("user_abc")).await.unwrap();
        store.set("tryOns", json!(3)).await.unwrap();
        store.remove("tryOns").await.unwrap();
        drop(store);

        let reopened = FileLocalStore::open(&path).await.unwrap();
        assert_eq!(reopened.get("userId").await.unwrap(), Some(json!("user_abc")));
        assert_eq!(reopened.get("tryOns").await.unwrap(), None);
    }

    #[tokio::test]
    async fn clear_empties_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        let store = FileLocalStore::open(&path).await.unwrap();
        store.set("verifiedItems", json!(2)).await.unwrap();
        store.clear().await.unwrap();

        let on_disk: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk, json!({}));
    }

    #[tokio::test]
    async fn a_corrupt_file_is_reported_as_unavailable_storage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, b"[1, 2, 3]").unwrap();

        match FileLocalStore::open(&path).await {
            Err(PortError::StorageUnavailable(message)) => {
                assert!(message.contains("not a JSON object"))
            }
            other => panic!("expected StorageUnavailable, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn failed_writes_leave_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("storage.json");
        let store = FileLocalStore::open(&path).await.unwrap();

        assert!(matches!(
            store.set("userId", json!("user_x")).await,
            Err(PortError::StorageUnavailable(_))
        ));
        assert_eq!(store.get("userId").await.unwrap(), None);
    }
}
