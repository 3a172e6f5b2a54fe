//! Local key-value persistence that survives restarts.
//!
//! Backed by a single JSON object on disk. Every write replaces the file
//! atomically (temp file in the same directory, then rename).

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const SESSION_KEY: &str = "makazi.auth.session";
pub const REMEMBER_EMAIL_KEY: &str = "makazi.auth.remember_email";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("store write task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Clone)]
pub struct LocalStore {
    path: PathBuf,
    entries: Arc<Mutex<BTreeMap<String, Value>>>,
}

impl LocalStore {
    /// Opens the store, starting empty if the file is missing or unreadable.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<BTreeMap<String, Value>>(&bytes) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Local store is corrupt, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), keys = entries.len(), "Local store opened");
        Ok(Self {
            path,
            entries: Arc::new(Mutex::new(entries)),
        })
    }

    /// Reads a typed value. A value that no longer decodes is treated as absent.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.entries.lock().await.get(key).cloned()?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key, error = %e, "Stored value has unexpected shape");
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value)?;
        let mut entries = self.entries.lock().await;
        let mut next = entries.clone();
        next.insert(key.to_string(), value);
        self.flush(&next).await?;
        *entries = next;
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.remove(key);
        self.flush(&next).await?;
        *entries = next;
        Ok(())
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.entries.lock().await.contains_key(key)
    }

    async fn flush(&self, entries: &BTreeMap<String, Value>) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(entries)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes)).await??;
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/store.json");

        let store = LocalStore::open(&path).await.unwrap();
        store.set(REMEMBER_EMAIL_KEY, &"wanjiru@example.co.ke").await.unwrap();

        let reopened = LocalStore::open(&path).await.unwrap();
        let email: Option<String> = reopened.get(REMEMBER_EMAIL_KEY).await;
        assert_eq!(email.as_deref(), Some("wanjiru@example.co.ke"));
    }

    #[tokio::test]
    async fn test_remove_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = LocalStore::open(&path).await.unwrap();
        store.set(SESSION_KEY, &serde_json::json!({"a": 1})).await.unwrap();
        store.remove(SESSION_KEY).await.unwrap();

        let reopened = LocalStore::open(&path).await.unwrap();
        assert!(!reopened.contains(SESSION_KEY).await);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("sub");
        let store = LocalStore::open(parent.join("store.json")).await.unwrap();
        store.set(REMEMBER_EMAIL_KEY, &"amina@example.co.ke").await.unwrap();

        std::fs::remove_dir_all(&parent).unwrap();
        std::fs::write(&parent, b"not a directory").unwrap();

        assert!(store.set(SESSION_KEY, &serde_json::json!({"a": 1})).await.is_err());
        assert!(!store.contains(SESSION_KEY).await);

        assert!(store.remove(REMEMBER_EMAIL_KEY).await.is_err());
        let email: Option<String> = store.get(REMEMBER_EMAIL_KEY).await;
        assert_eq!(email.as_deref(), Some("amina@example.co.ke"));
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, b"{not json").unwrap();
        let store = LocalStore::open(&path).await.unwrap();
        assert!(!store.contains(SESSION_KEY).await);
    }

    #[tokio::test]
    async fn test_wrong_shape_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path().join("s.json")).await.unwrap();
        store.set("n", &"text").await.unwrap();
        let n: Option<u32> = store.get("n").await;
        assert!(n.is_none());
    }
}
