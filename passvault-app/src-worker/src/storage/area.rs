//! Key-value storage areas.
//!
//! Mirrors the extension's two storage scopes: a persistent local area that
//! survives restarts, and a session area that is dropped with the process.
//! Values are arbitrary JSON so records keep the exact shapes other
//! components already read.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::error::{StorageError, StorageResult};

/// A key-value storage area.
///
/// `set_many` and `remove_many` apply all of their entries in one write, so
/// callers can rely on them for records that must change together.
#[async_trait]
pub trait StorageArea: Send + Sync {
    async fn get(&self, key: &str) -> StorageResult<Option<Value>>;

    async fn set_many(&self, entries: Vec<(String, Value)>) -> StorageResult<()>;

    async fn remove_many(&self, keys: &[&str]) -> StorageResult<()>;

    async fn clear(&self) -> StorageResult<()>;

    async fn get_many(&self, keys: &[&str]) -> StorageResult<HashMap<String, Value>> {
        let mut found = HashMap::new();
        for key in keys {
            if let Some(value) = self.get(key).await? {
                found.insert((*key).to_string(), value);
            }
        }
        Ok(found)
    }

    async fn set(&self, key: &str, value: Value) -> StorageResult<()> {
        self.set_many(vec![(key.to_string(), value)]).await
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.remove_many(&[key]).await
    }

    async fn contains(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

/// Read a value and deserialize it, treating JSON `null` as absent.
pub async fn get_as<T: DeserializeOwned>(
    area: &dyn StorageArea,
    key: &str,
) -> StorageResult<Option<T>> {
    match area.get(key).await? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
    }
}

/// Serialize a value and store it under `key`.
pub async fn set_as<T: Serialize + ?Sized>(
    area: &dyn StorageArea,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    area.set(key, serde_json::to_value(value)?).await
}

// ============================================================================
// In-memory area
// ============================================================================

/// Volatile storage; used for the session scope and in tests.
#[derive(Default)]
pub struct MemoryArea {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryArea {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl StorageArea for MemoryArea {
    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set_many(&self, entries: Vec<(String, Value)>) -> StorageResult<()> {
        let mut map = self.entries.write().await;
        map.extend(entries);
        Ok(())
    }

    async fn remove_many(&self, keys: &[&str]) -> StorageResult<()> {
        let mut map = self.entries.write().await;
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }

    async fn clear(&self) -> StorageResult<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}

// ============================================================================
// File-backed area
// ============================================================================

/// Persistent storage backed by a single JSON object on disk.
///
/// Every write serializes the full map to a temp file and renames it over
/// the existing file, so a crash leaves either the old or the new contents.
pub struct FileArea {
    path: PathBuf,
    entries: Mutex<HashMap<String, Value>>,
}

impl FileArea {
    /// Open (or lazily create) the area stored at `path`.
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();

        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                HashMap::new()
            } else {
                match serde_json::from_str::<Value>(&content)? {
                    Value::Object(map) => map.into_iter().collect(),
                    other => {
                        return Err(StorageError::Corrupted(format!(
                            "expected a JSON object in {:?}, found {}",
                            path,
                            json_kind(&other)
                        )))
                    }
                }
            }
        } else {
            HashMap::new()
        };

        debug!("Opened storage area {:?} with {} keys", path, entries.len());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &HashMap<String, Value>) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_vec_pretty(entries)?;

        // Write atomically (write to temp file, then rename)
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, &self.path)?;

        // Wrapped keys and the vault live here
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&self.path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(&self.path, perms)?;
        }

        Ok(())
    }
}

#[async_trait]
impl StorageArea for FileArea {
    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set_many(&self, entries: Vec<(String, Value)>) -> StorageResult<()> {
        let mut current = self.entries.lock().await;
        let mut next = current.clone();
        next.extend(entries);
        self.persist(&next)?;
        *current = next;
        Ok(())
    }

    async fn remove_many(&self, keys: &[&str]) -> StorageResult<()> {
        let mut current = self.entries.lock().await;
        if !keys.iter().any(|k| current.contains_key(*k)) {
            return Ok(());
        }
        let mut next = current.clone();
        for key in keys {
            next.remove(*key);
        }
        self.persist(&next)?;
        *current = next;
        Ok(())
    }

    async fn clear(&self) -> StorageResult<()> {
        let mut current = self.entries.lock().await;
        let next = HashMap::new();
        self.persist(&next)?;
        *current = next;
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
