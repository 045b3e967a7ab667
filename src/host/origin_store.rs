//! Origin Store Module
//!
//! The synchronous same-origin store. Every successful write that changes a
//! value raises a storage event to all subscribers in the host.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::host::EVENT_CAPACITY;

// == Storage Event ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    /// Context that performed the write
    pub writer: Uuid,
}

// == Origin Store ==
/// Synchronous string store shared by every context of one origin.
pub struct OriginStore {
    items: RwLock<BTreeMap<String, String>>,
    quota: usize,
    events: broadcast::Sender<StorageEvent>,
}

impl OriginStore {
    pub fn new(quota: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            items: RwLock::new(BTreeMap::new()),
            quota,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }

    pub fn get_item(&self, key: &str) -> Option<String> {
        self.items.read().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.items.read().keys().cloned().collect()
    }

    /// Stores `value`, failing without side effects if the quota would be exceeded.
    pub fn set_item(&self, key: &str, value: String, writer: Uuid) -> Result<()> {
        let old_value = {
            let mut items = self.items.write();
            let current: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = current + key.len() + value.len();
            if needed > self.quota {
                return Err(SyncError::QuotaExceeded {
                    needed,
                    quota: self.quota,
                });
            }
            items.insert(key.to_string(), value.clone())
        };

        if old_value.as_ref() != Some(&value) {
            let _ = self.events.send(StorageEvent {
                key: key.to_string(),
                old_value,
                new_value: Some(value),
                writer,
            });
        }
        Ok(())
    }

    pub fn remove_item(&self, key: &str, writer: Uuid) {
        let old_value = self.items.write().remove(key);
        if old_value.is_some() {
            let _ = self.events.send(StorageEvent {
                key: key.to_string(),
                old_value,
                new_value: None,
                writer,
            });
        }
    }
}
