//! Backend Adapter Module
//!
//! Uniform async get/set/list-keys over whichever durable store the host
//! offers, selected once at startup.

mod watermark;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};
use uuid::Uuid;

pub use watermark::{Watermark, WATERMARK_KEY};

use crate::error::{Result, SyncError};
use crate::host::{Host, OriginStore, ScriptStore};
use crate::notify::Notifier;

// == Backend Kind ==
/// Durable store implementation, richest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Asynchronous quota-tracked store with native change events
    Script,
    /// Synchronous same-origin store
    Origin,
    /// Nothing durable: the cache is the only copy
    None,
}

impl BackendKind {
    /// Picks the first kind in `order` the host can provide.
    pub fn select(order: &[BackendKind], host: &Host) -> BackendKind {
        let selected = order
            .iter()
            .copied()
            .find(|kind| match kind {
                BackendKind::Script => host.script_store().is_some(),
                BackendKind::Origin => host.origin_store().is_some(),
                BackendKind::None => true,
            })
            .unwrap_or(BackendKind::None);

        if selected == BackendKind::None {
            warn!(
                "{}; using a temporary in-memory cache for now",
                SyncError::StorageUnavailable
            );
        }
        selected
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Script => "script",
            BackendKind::Origin => "origin",
            BackendKind::None => "none",
        };
        f.write_str(name)
    }
}

impl FromStr for BackendKind {
    type Err = SyncError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "script" => Ok(BackendKind::Script),
            "origin" | "localstorage" => Ok(BackendKind::Origin),
            "none" => Ok(BackendKind::None),
            other => Err(SyncError::InvalidRequest(format!(
                "unknown backend: {}",
                other
            ))),
        }
    }
}

enum Store {
    Script(Arc<ScriptStore>),
    Origin {
        store: Arc<OriginStore>,
        prefix: String,
    },
    None,
}

// == Backend Adapter ==
pub struct BackendAdapter {
    kind: BackendKind,
    store: Store,
    tab_id: Uuid,
    notifier: Arc<Notifier>,
    watermark: Watermark,
}

impl BackendAdapter {
    /// `kind` must come from `BackendKind::select` against the same host.
    /// Same-origin keys are namespaced with `key_prefix`.
    pub fn new(kind: BackendKind, host: &Host, key_prefix: &str, notifier: Arc<Notifier>) -> Self {
        let store = match kind {
            BackendKind::Script => host.script_store().cloned().map(Store::Script),
            BackendKind::Origin => host.origin_store().cloned().map(|store| Store::Origin {
                store,
                prefix: key_prefix.to_string(),
            }),
            BackendKind::None => None,
        }
        .unwrap_or(Store::None);

        let kind = match store {
            Store::None => BackendKind::None,
            _ => kind,
        };

        Self {
            kind,
            store,
            tab_id: notifier.tab_id(),
            notifier,
            watermark: Watermark::new(),
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn watermark(&self) -> &Watermark {
        &self.watermark
    }

    // == List Keys ==
    /// Enumerates every key in durable storage. Without a backend the
    /// cache's own key set stands in.
    pub async fn list_keys_or<F>(&self, cached_keys: F) -> Result<Vec<String>>
    where
        F: FnOnce() -> Vec<String>,
    {
        match &self.store {
            Store::Script(store) => store.list_values().await,
            Store::Origin { store, prefix } => Ok(store
                .keys()
                .into_iter()
                .filter_map(|k| k.strip_prefix(prefix.as_str()).map(str::to_string))
                .collect()),
            Store::None => Ok(cached_keys()),
        }
    }

    // == Get ==
    /// Returns the stored value, or `default` when absent or malformed.
    pub async fn get(&self, key: &str, default: Value) -> Result<Value> {
        Ok(self.fetch(key).await?.unwrap_or(default))
    }

    /// Returns the stored value; absent and malformed values are `None`.
    /// A stored `null` is a value like any other. Malformed values are
    /// logged, never returned as errors.
    pub async fn fetch(&self, key: &str) -> Result<Option<Value>> {
        let Some(raw) = self.get_raw(key).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(source) => {
                let err = SyncError::MalformedValue {
                    key: key.to_string(),
                    source,
                };
                error!("{}: treating as absent", err);
                Ok(None)
            }
        }
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        match &self.store {
            Store::Script(store) => store.get_value(key).await,
            Store::Origin { store, prefix } => Ok(store.get_item(&format!("{}{}", prefix, key))),
            Store::None => Err(SyncError::StorageUnavailable),
        }
    }

    // == Watermark ==
    /// Reads the durable watermark without touching the observed one.
    pub async fn read_watermark(&self) -> Result<Option<i64>> {
        Ok(self.fetch(WATERMARK_KEY).await?.and_then(|v| v.as_i64()))
    }

    // == Set ==
    /// Persists `value`, advances the watermark, then notifies siblings once.
    ///
    /// The new stamp only counts as reconciled when no sibling wrote since
    /// this context last pulled; otherwise the next poll still pulls.
    pub async fn set(&self, key: &str, value: &Value) -> Result<()> {
        if matches!(self.store, Store::None) {
            return Err(SyncError::StorageUnavailable);
        }

        let caught_up = match self.read_watermark().await {
            Ok(Some(durable)) => {
                self.watermark.observe(durable);
                !self.watermark.is_behind(durable)
            }
            Ok(None) => true,
            Err(_) => false,
        };

        let raw = serde_json::to_string(value)?;
        self.put_raw(key, raw).await.map_err(rejected)?;

        let stamp = self.watermark.next_stamp();
        self.put_raw(WATERMARK_KEY, stamp.to_string())
            .await
            .map_err(rejected)?;
        if caught_up {
            self.watermark.mark_reconciled(stamp);
        }
        debug!("persisted {} at watermark {}", key, stamp);

        self.notifier.notify(key);
        Ok(())
    }

    async fn put_raw(&self, key: &str, raw: String) -> Result<()> {
        match &self.store {
            Store::Script(store) => store.set_value(key, raw, self.tab_id).await,
            Store::Origin { store, prefix } => {
                store.set_item(&format!("{}{}", prefix, key), raw, self.tab_id)
            }
            Store::None => Err(SyncError::StorageUnavailable),
        }
    }
}

/// Quota failures keep their own variant; everything else is a rejected write.
fn rejected(err: SyncError) -> SyncError {
    match err {
        SyncError::QuotaExceeded { .. } | SyncError::StorageUnavailable => err,
        SyncError::WriteRejected(_) => err,
        other => SyncError::WriteRejected(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyKind;
    use serde_json::json;

    fn adapter(kind: BackendKind, host: &Host) -> BackendAdapter {
        let notifier = Arc::new(Notifier::new(NotifyKind::None, Uuid::new_v4(), host, "chan"));
        BackendAdapter::new(kind, host, "pfx_", notifier)
    }

    #[test]
    fn test_select_follows_order_and_capabilities() {
        let full = Host::in_memory("https://example.test");
        assert_eq!(
            BackendKind::select(&[BackendKind::Script, BackendKind::Origin], &full),
            BackendKind::Script
        );
        assert_eq!(
            BackendKind::select(&[BackendKind::Origin, BackendKind::Script], &full),
            BackendKind::Origin
        );

        let origin_only = Host::builder("https://example.test")
            .origin_store(OriginStore::new(1024))
            .build();
        assert_eq!(
            BackendKind::select(&[BackendKind::Script, BackendKind::Origin], &origin_only),
            BackendKind::Origin
        );

        let bare = Host::builder("https://example.test").build();
        assert_eq!(
            BackendKind::select(&[BackendKind::Script, BackendKind::Origin], &bare),
            BackendKind::None
        );
    }

    #[tokio::test]
    async fn test_set_writes_value_and_watermark() {
        let host = Host::in_memory("https://example.test");
        let backend = adapter(BackendKind::Script, &host);

        backend.set("k", &json!({"a": 1})).await.unwrap();

        assert_eq!(backend.get("k", json!({})).await.unwrap(), json!({"a": 1}));
        let stamp = backend.read_watermark().await.unwrap().unwrap();
        assert_eq!(stamp, backend.watermark().observed());
        let mut keys = backend.list_keys_or(Vec::new).await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["k".to_string(), WATERMARK_KEY.to_string()]);
    }

    #[tokio::test]
    async fn test_origin_backend_prefixes_keys() {
        let host = Host::in_memory("https://example.test");
        let backend = adapter(BackendKind::Origin, &host);
        let store = host.origin_store().unwrap();
        store
            .set_item("unrelated", "1".to_string(), Uuid::new_v4())
            .unwrap();

        backend.set("k", &json!([1, 2])).await.unwrap();

        assert_eq!(store.get_item("pfx_k"), Some("[1,2]".to_string()));
        let keys = backend.list_keys_or(Vec::new).await.unwrap();
        assert!(keys.contains(&"k".to_string()));
        assert!(!keys.contains(&"unrelated".to_string()));
    }

    #[tokio::test]
    async fn test_malformed_value_is_treated_as_absent() {
        let host = Host::in_memory("https://example.test");
        let backend = adapter(BackendKind::Script, &host);
        host.script_store()
            .unwrap()
            .set_value("bad", "{not json".to_string(), Uuid::new_v4())
            .await
            .unwrap();

        assert_eq!(backend.get("bad", json!("dflt")).await.unwrap(), json!("dflt"));
        assert_eq!(backend.fetch("bad").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stored_null_is_a_value() {
        let host = Host::in_memory("https://example.test");
        let backend = adapter(BackendKind::Script, &host);

        backend.set("k", &Value::Null).await.unwrap();

        assert_eq!(backend.fetch("k").await.unwrap(), Some(Value::Null));
        assert_eq!(backend.get("k", json!("dflt")).await.unwrap(), Value::Null);
        assert_eq!(backend.fetch("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_after_unseen_sibling_write_stays_behind() {
        let host = Host::in_memory("https://example.test");
        let ours = adapter(BackendKind::Script, &host);
        let sibling = adapter(BackendKind::Script, &host);

        ours.set("a", &json!(1)).await.unwrap();
        let own = ours.watermark().reconciled();
        assert_eq!(Some(own), ours.read_watermark().await.unwrap());

        sibling.set("b", &json!(2)).await.unwrap();
        ours.set("a", &json!(3)).await.unwrap();

        let durable = ours.read_watermark().await.unwrap().unwrap();
        assert_eq!(ours.watermark().reconciled(), own);
        assert!(ours.watermark().is_behind(durable));
    }

    #[tokio::test]
    async fn test_no_backend() {
        let host = Host::builder("https://example.test").build();
        let backend = adapter(BackendKind::Script, &host);

        assert_eq!(backend.kind(), BackendKind::None);
        assert!(matches!(
            backend.set("k", &json!(1)).await,
            Err(SyncError::StorageUnavailable)
        ));
        let keys = backend
            .list_keys_or(|| vec!["cached".to_string()])
            .await
            .unwrap();
        assert_eq!(keys, vec!["cached".to_string()]);
    }

    #[tokio::test]
    async fn test_quota_failure_keeps_variant() {
        let host = Host::builder("https://example.test")
            .script_store(ScriptStore::in_memory(4))
            .build();
        let backend = adapter(BackendKind::Script, &host);

        let result = backend.set("key", &json!("too long")).await;
        assert!(matches!(result, Err(SyncError::QuotaExceeded { .. })));
    }
}
