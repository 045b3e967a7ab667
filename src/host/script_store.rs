//! Script Store Module
//!
//! The richer asynchronous durable store: string values, a byte quota, and
//! native value-change listeners. Backed either by shared memory or by a
//! JSON file that separate processes may open concurrently.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tokio::sync::{broadcast, Mutex};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::host::EVENT_CAPACITY;

// == Value Change ==
/// Raised to every listener after a value is written or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueChange {
    pub key: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    /// Context that performed the write
    pub writer: Uuid,
}

enum Storage {
    Memory(RwLock<BTreeMap<String, String>>),
    File(PathBuf),
}

// == Script Store ==
/// Asynchronous quota-tracked key-value store.
///
/// A write is a read-modify-write of the whole map. Writes through one
/// handle are serialized; separate processes sharing a file are not, and
/// resolve as last-writer-wins.
pub struct ScriptStore {
    storage: Storage,
    writes: Mutex<()>,
    quota: usize,
    changes: broadcast::Sender<ValueChange>,
}

impl ScriptStore {
    /// Creates a store that lives in memory for the lifetime of the host.
    pub fn in_memory(quota: usize) -> Self {
        Self::with_storage(Storage::Memory(RwLock::new(BTreeMap::new())), quota)
    }

    /// Opens a store persisted as a JSON object at `path`. The file is
    /// created lazily on first write.
    pub fn open(path: impl AsRef<Path>, quota: usize) -> Self {
        Self::with_storage(Storage::File(path.as_ref().to_path_buf()), quota)
    }

    fn with_storage(storage: Storage, quota: usize) -> Self {
        let (changes, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            storage,
            writes: Mutex::new(()),
            quota,
            changes,
        }
    }

    /// Byte quota covering every key and value.
    pub fn quota(&self) -> usize {
        self.quota
    }

    /// Subscribes to value-change events from every writer.
    pub fn subscribe(&self) -> broadcast::Receiver<ValueChange> {
        self.changes.subscribe()
    }

    // == List ==
    /// Lists every stored key.
    pub async fn list_values(&self) -> Result<Vec<String>> {
        Ok(self.load().await?.into_keys().collect())
    }

    // == Get ==
    /// Returns the raw stored string, if any.
    pub async fn get_value(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load().await?.remove(key))
    }

    // == Set ==
    /// Stores `value` under `key` and raises a change event.
    pub async fn set_value(&self, key: &str, value: String, writer: Uuid) -> Result<()> {
        let _write = self.writes.lock().await;
        let mut values = self.load().await?;
        let old_value = values.insert(key.to_string(), value.clone());

        let needed = usage_of(&values);
        if needed > self.quota {
            return Err(SyncError::QuotaExceeded {
                needed,
                quota: self.quota,
            });
        }

        self.save(values).await?;
        debug!("script store: set {} ({} bytes in use)", key, needed);

        // No listeners is not an error
        let _ = self.changes.send(ValueChange {
            key: key.to_string(),
            old_value,
            new_value: Some(value),
            writer,
        });
        Ok(())
    }

    // == Delete ==
    /// Removes `key`, returning whether it existed.
    pub async fn delete_value(&self, key: &str, writer: Uuid) -> Result<bool> {
        let _write = self.writes.lock().await;
        let mut values = self.load().await?;
        let Some(old_value) = values.remove(key) else {
            return Ok(false);
        };
        self.save(values).await?;

        let _ = self.changes.send(ValueChange {
            key: key.to_string(),
            old_value: Some(old_value),
            new_value: None,
            writer,
        });
        Ok(true)
    }

    // == Usage ==
    /// Bytes currently counted against the quota.
    pub async fn usage(&self) -> Result<usize> {
        Ok(usage_of(&self.load().await?))
    }

    async fn load(&self) -> Result<BTreeMap<String, String>> {
        match &self.storage {
            Storage::Memory(values) => {
                // Callers must observe a suspension point like any other backend call
                tokio::task::yield_now().await;
                Ok(values.read().clone())
            }
            Storage::File(path) => match tokio::fs::read(path).await {
                Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
                Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
                Err(e) => Err(e.into()),
            },
        }
    }

    async fn save(&self, values: BTreeMap<String, String>) -> Result<()> {
        match &self.storage {
            Storage::Memory(current) => {
                *current.write() = values;
                Ok(())
            }
            Storage::File(path) => {
                let bytes = serde_json::to_vec(&values)?;
                let tmp = temp_path_for(path);
                tokio::fs::write(&tmp, bytes).await?;
                tokio::fs::rename(&tmp, path).await?;
                Ok(())
            }
        }
    }
}

fn usage_of(values: &BTreeMap<String, String>) -> usize {
    values.iter().map(|(k, v)| k.len() + v.len()).sum()
}

/// Unique sibling path so concurrent writers never share a temp file.
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".to_string());
    path.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()))
}
