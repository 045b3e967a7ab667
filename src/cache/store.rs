//! Cache Store Module
//!
//! The in-memory mirror of durable storage owned by one execution context.
//! Reads and writes are synchronous; persistence and reconciliation go
//! through the backend adapter and suspend.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::backend::{BackendAdapter, WATERMARK_KEY};
use crate::cache::{CacheEntry, Node, SyncMode, SyncStats};
use crate::error::{Result, SyncError};

struct Inner {
    entries: RwLock<BTreeMap<String, CacheEntry>>,
    backend: Arc<BackendAdapter>,
    mode: SyncMode,
    /// Runtime auto-mode writes persist on, captured at construction
    runtime: Option<Handle>,
    stats: Mutex<SyncStats>,
}

// == Cache Store ==
/// Cheap to clone; clones share the same cache.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<Inner>,
}

// == Reconcile Report ==
/// Outcome of one reconciliation pull.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Keys whose value was read from the backend
    pub fetched: usize,
    /// Keys new to the cache
    pub inserted: usize,
    /// Keys merged into an existing entry
    pub merged: usize,
    /// Keys listed but absent or malformed by the time they were read
    pub skipped: usize,
    /// Backend calls that failed
    pub failed: usize,
}

// == Pending Write ==
/// Handle on the persistence step of a `set`. The cache is already updated
/// when this is returned; dropping it does not cancel the write.
pub struct PendingWrite {
    node: Node,
    task: Option<JoinHandle<Result<()>>>,
    rejected: Option<String>,
}

impl PendingWrite {
    /// Live handle on the written entry.
    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn into_node(self) -> Node {
        self.node
    }

    /// True when nothing persists until a flush: manual mode, or auto mode
    /// with no runtime to persist on.
    pub fn is_deferred(&self) -> bool {
        self.task.is_none() && self.rejected.is_none()
    }

    /// True when the cache refused the write.
    pub fn is_rejected(&self) -> bool {
        self.rejected.is_some()
    }

    /// Waits for the backend write to finish.
    pub async fn wait(self) -> Result<()> {
        if let Some(reason) = self.rejected {
            return Err(SyncError::InvalidRequest(reason));
        }
        match self.task {
            None => Ok(()),
            Some(task) => task
                .await
                .map_err(|e| SyncError::WriteRejected(e.to_string()))?,
        }
    }
}

impl CacheStore {
    // == Constructor ==
    pub fn new(backend: Arc<BackendAdapter>, mode: SyncMode) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(BTreeMap::new()),
                backend,
                mode,
                runtime: Handle::try_current().ok(),
                stats: Mutex::new(SyncStats::new()),
            }),
        }
    }

    pub fn mode(&self) -> SyncMode {
        self.inner.mode
    }

    pub fn backend(&self) -> &Arc<BackendAdapter> {
        &self.inner.backend
    }

    // == Get ==
    /// Returns the live value for `key`.
    ///
    /// An absent key yields a detached node holding `default` and is not
    /// created. A present key is returned as is, `null` included.
    pub fn get(&self, key: &str, default: Value) -> Node {
        match self.inner.entries.read().get(key) {
            Some(entry) => entry.node.clone(),
            None => Node::new(default),
        }
    }

    /// Returns the live value for `key`, creating it from `default` first
    /// when absent.
    pub fn get_or_insert(&self, key: &str, default: Value) -> Node {
        self.inner
            .entries
            .write()
            .entry(key.to_string())
            .or_insert_with(|| CacheEntry::dirty(Node::new(default)))
            .node
            .clone()
    }

    /// Live value for `key`, without defaulting.
    pub fn peek(&self, key: &str) -> Option<Node> {
        self.inner.entries.read().get(key).map(|e| e.node.clone())
    }

    /// Whether `key` is represented in the cache (not the backend).
    pub fn has(&self, key: &str) -> bool {
        self.inner.entries.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.entries.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    /// Deep copy of the whole cache as one object.
    pub fn snapshot(&self) -> Value {
        Value::Object(
            self.inner
                .entries
                .read()
                .iter()
                .map(|(k, e)| (k.clone(), e.node.to_value()))
                .collect::<Map<String, Value>>(),
        )
    }

    // == Set ==
    /// Writes `value` into the cache immediately. In auto mode the backend
    /// write is started in the background; in manual mode the entry is only
    /// marked dirty. The watermark key is owned by the backend and cannot
    /// be written.
    pub fn set(&self, key: &str, value: Value) -> PendingWrite {
        if key == WATERMARK_KEY {
            warn!("ignoring write to reserved key {}", key);
            return PendingWrite {
                node: Node::new(value),
                task: None,
                rejected: Some(format!("key '{}' is reserved", key)),
            };
        }

        let (node, version) = {
            let mut entries = self.inner.entries.write();
            match entries.get_mut(key) {
                Some(entry) => {
                    entry.node.assign(value.clone());
                    (entry.node.clone(), entry.touch())
                }
                None => {
                    let entry = CacheEntry::dirty(Node::new(value.clone()));
                    let written = (entry.node.clone(), entry.version());
                    entries.insert(key.to_string(), entry);
                    written
                }
            }
        };
        debug!("cache: set {} (version {})", key, version);

        let task = match self.inner.mode {
            SyncMode::Auto => match self.runtime() {
                Some(runtime) => Some(runtime.spawn(persist(
                    self.inner.clone(),
                    key.to_string(),
                    value,
                    version,
                ))),
                None => {
                    warn!("no runtime to persist {}, left dirty for the next flush", key);
                    None
                }
            },
            SyncMode::Manual => None,
        };
        PendingWrite {
            node,
            task,
            rejected: None,
        }
    }

    fn runtime(&self) -> Option<Handle> {
        self.inner
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
    }

    // == Dirty Tracking ==
    /// Records an in-place edit of `key`'s nested value so the next
    /// `flush_dirty` persists it. Returns false if the key is absent.
    pub fn mark_dirty(&self, key: &str) -> bool {
        match self.inner.entries.write().get_mut(key) {
            Some(entry) => {
                entry.touch();
                true
            }
            None => false,
        }
    }

    pub fn is_dirty(&self, key: &str) -> bool {
        self.inner
            .entries
            .read()
            .get(key)
            .map(CacheEntry::is_dirty)
            .unwrap_or(false)
    }

    pub fn dirty_keys(&self) -> Vec<String> {
        self.inner
            .entries
            .read()
            .iter()
            .filter(|(_, e)| e.is_dirty())
            .map(|(k, _)| k.clone())
            .collect()
    }

    // == Flush ==
    /// Persists every cached key. The previous durable value is unknown, so
    /// each key is announced as a full change.
    pub async fn sync(&self) -> Result<usize> {
        self.flush_entries(false).await
    }

    /// Persists only keys modified since they were last persisted.
    pub async fn flush_dirty(&self) -> Result<usize> {
        self.flush_entries(true).await
    }

    /// Writes one key at a time so a context's own writes land in call order.
    /// Keeps going after a failure and reports the first one.
    async fn flush_entries(&self, only_dirty: bool) -> Result<usize> {
        let pending: Vec<(String, Value, u64)> = self
            .inner
            .entries
            .read()
            .iter()
            .filter(|(k, e)| k.as_str() != WATERMARK_KEY && (!only_dirty || e.is_dirty()))
            .map(|(k, e)| (k.clone(), e.node.to_value(), e.version()))
            .collect();

        let mut persisted = 0;
        let mut first_error = None;
        for (key, value, version) in pending {
            match persist(self.inner.clone(), key, value, version).await {
                Ok(()) => persisted += 1,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(persisted),
        }
    }

    // == Reconcile ==
    /// Pulls every key from the backend and merges it into the cache without
    /// replacing composites that application code may hold. Keys missing
    /// from the backend are left alone. Backend failures only count as
    /// unavailable values.
    ///
    /// The watermark is read before anything else and only recorded as
    /// reconciled when the whole pull succeeded, so a later poll retries
    /// a failed one.
    pub async fn reconcile(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let backend = &self.inner.backend;

        let starting_stamp = match backend.read_watermark().await {
            Ok(stamp) => stamp,
            Err(SyncError::StorageUnavailable) => None,
            Err(e) => {
                warn!("reconcile: could not read watermark: {}", e);
                report.failed += 1;
                None
            }
        };

        let keys = match backend.list_keys_or(|| self.keys()).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("reconcile: could not list keys: {}", e);
                report.failed += 1;
                return report;
            }
        };

        let fetched = join_all(keys.into_iter().map(|key| async move {
            let value = backend.fetch(&key).await;
            (key, value)
        }))
        .await;

        let total = {
            let mut entries = self.inner.entries.write();
            for (key, value) in fetched {
                match value {
                    Ok(Some(value)) => {
                        report.fetched += 1;
                        if key == WATERMARK_KEY {
                            if let Some(stamp) = value.as_i64() {
                                backend.watermark().observe(stamp);
                            }
                        }
                        match entries.get_mut(&key) {
                            Some(entry) => {
                                entry.node.merge(&value);
                                entry.mark_clean();
                                report.merged += 1;
                            }
                            None => {
                                entries.insert(key, CacheEntry::clean(Node::new(value)));
                                report.inserted += 1;
                            }
                        }
                    }
                    Ok(None) | Err(SyncError::StorageUnavailable) => report.skipped += 1,
                    Err(e) => {
                        warn!("reconcile: could not fetch {}: {}", key, e);
                        report.failed += 1;
                    }
                }
            }
            entries.len()
        };

        if let (0, Some(stamp)) = (report.failed, starting_stamp) {
            backend.watermark().mark_reconciled(stamp);
        }

        {
            let mut stats = self.inner.stats.lock();
            stats.record_reconcile();
            stats.set_total_entries(total);
        }
        debug!("reconcile: {:?}", report);
        report
    }

    // == Stats ==
    pub fn stats(&self) -> SyncStats {
        let mut stats = self.inner.stats.lock().clone();
        stats.set_total_entries(self.len());
        stats
    }

    pub(crate) fn record<F: FnOnce(&mut SyncStats)>(&self, f: F) {
        f(&mut self.inner.stats.lock());
    }
}

async fn persist(inner: Arc<Inner>, key: String, value: Value, version: u64) -> Result<()> {
    match inner.backend.set(&key, &value).await {
        Ok(()) => {
            if let Some(entry) = inner.entries.write().get_mut(&key) {
                entry.mark_persisted(version);
            }
            inner.stats.lock().record_write();
            Ok(())
        }
        Err(err) => {
            inner.stats.lock().record_write_failure();
            match &err {
                SyncError::StorageUnavailable => debug!("not persisting {}: {}", key, err),
                _ => error!("failed to persist {}: {}", key, err),
            }
            Err(err)
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;
    use crate::host::Host;
    use crate::notify::{Notifier, NotifyKind};
    use serde_json::json;
    use uuid::Uuid;

    fn store_on(host: &Host, kind: BackendKind, mode: SyncMode) -> CacheStore {
        let notifier = Arc::new(Notifier::new(NotifyKind::None, Uuid::new_v4(), host, "chan"));
        let backend = Arc::new(BackendAdapter::new(kind, host, "pfx_", notifier));
        CacheStore::new(backend, mode)
    }

    #[test]
    fn test_get_absent_does_not_create() {
        let host = Host::in_memory("https://example.test");
        let store = store_on(&host, BackendKind::Script, SyncMode::Manual);

        let value = store.get("missing", json!({}));

        assert_eq!(value.to_value(), json!({}));
        assert!(!store.has("missing"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_stored_null_is_returned_as_is() {
        let host = Host::in_memory("https://example.test");
        let store = store_on(&host, BackendKind::Script, SyncMode::Manual);
        store.set("k", Value::Null);

        let value = store.get("k", json!({"fresh": true}));

        assert!(value.ptr_eq(&store.peek("k").unwrap()));
        assert_eq!(value.to_value(), Value::Null);
    }

    #[tokio::test]
    async fn test_remote_null_reaches_reader() {
        let host = Host::in_memory("https://example.test");
        let writer = store_on(&host, BackendKind::Script, SyncMode::Manual);
        let reader = store_on(&host, BackendKind::Script, SyncMode::Manual);

        writer.set("k", json!({"a": 1}));
        writer.sync().await.unwrap();
        reader.reconcile().await;
        let held = reader.peek("k").unwrap();

        writer.set("k", Value::Null);
        writer.sync().await.unwrap();
        let report = reader.reconcile().await;

        assert_eq!(report.skipped, 0);
        assert_eq!(report.merged, 2);
        assert_eq!(held.to_value(), Value::Null);
        assert_eq!(reader.get("k", json!({})).to_value(), Value::Null);
    }

    #[test]
    fn test_manual_set_is_immediate_and_dirty() {
        let host = Host::in_memory("https://example.test");
        let store = store_on(&host, BackendKind::Script, SyncMode::Manual);

        let write = store.set("k", json!({"a": 1}));

        assert!(write.is_deferred());
        assert_eq!(store.get("k", json!({})).to_value(), json!({"a": 1}));
        assert_eq!(store.dirty_keys(), vec!["k".to_string()]);
    }

    #[test]
    fn test_set_keeps_held_handle() {
        let host = Host::in_memory("https://example.test");
        let store = store_on(&host, BackendKind::Script, SyncMode::Manual);
        let held = store.set("k", json!(1)).into_node();

        store.set("k", json!(2));

        assert_eq!(held.as_i64(), Some(2));
    }

    #[tokio::test]
    async fn test_auto_set_persists() {
        let host = Host::in_memory("https://example.test");
        let store = store_on(&host, BackendKind::Script, SyncMode::Auto);

        let write = store.set("k", json!({"a": 1}));
        assert_eq!(store.peek("k").unwrap().to_value(), json!({"a": 1}));
        write.wait().await.unwrap();

        assert!(!store.is_dirty("k"));
        assert_eq!(
            store.backend().get("k", json!(null)).await.unwrap(),
            json!({"a": 1})
        );
        assert_eq!(store.stats().writes, 1);
    }

    #[test]
    fn test_auto_set_without_runtime_stays_dirty() {
        let host = Host::in_memory("https://example.test");
        let store = store_on(&host, BackendKind::Script, SyncMode::Auto);

        let write = store.set("k", json!({"a": 1}));

        assert!(write.is_deferred());
        assert!(store.is_dirty("k"));
        assert_eq!(store.get("k", json!({})).to_value(), json!({"a": 1}));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_auto_set_from_plain_thread_persists() {
        let host = Host::in_memory("https://example.test");
        let store = store_on(&host, BackendKind::Script, SyncMode::Auto);

        let writer = store.clone();
        let write = std::thread::spawn(move || writer.set("k", json!([1])))
            .join()
            .unwrap();
        assert!(!write.is_deferred());
        write.wait().await.unwrap();

        assert_eq!(store.backend().fetch("k").await.unwrap(), Some(json!([1])));
        assert!(!store.is_dirty("k"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_auto_writes_all_persist() {
        let host = Host::in_memory("https://example.test");
        let store = store_on(&host, BackendKind::Script, SyncMode::Auto);

        let writes: Vec<PendingWrite> = (0..100)
            .map(|i| store.set(&format!("k{}", i), json!(i)))
            .collect();
        for write in writes {
            write.wait().await.unwrap();
        }

        let keys = store.backend().list_keys_or(Vec::new).await.unwrap();
        assert_eq!(keys.len(), 101); // values + watermark
        assert!(store.dirty_keys().is_empty());
        assert_eq!(store.backend().fetch("k42").await.unwrap(), Some(json!(42)));
    }

    #[tokio::test]
    async fn test_watermark_key_cannot_be_written() {
        let host = Host::in_memory("https://example.test");
        let store = store_on(&host, BackendKind::Script, SyncMode::Auto);

        let write = store.set(WATERMARK_KEY, json!(1));

        assert!(write.is_rejected());
        assert!(!store.has(WATERMARK_KEY));
        assert!(matches!(
            write.wait().await,
            Err(SyncError::InvalidRequest(_))
        ));
        assert_eq!(store.backend().read_watermark().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_no_backend_keeps_cache_authoritative() {
        let host = Host::builder("https://example.test").build();
        let store = store_on(&host, BackendKind::None, SyncMode::Auto);

        let result = store.set("k", json!({"a": 1})).wait().await;

        assert!(matches!(result, Err(SyncError::StorageUnavailable)));
        assert_eq!(store.get("k", json!({})).to_value(), json!({"a": 1}));
        assert_eq!(store.reconcile().await.skipped, 1);
        assert_eq!(store.get("k", json!({})).to_value(), json!({"a": 1}));
        assert_eq!(store.stats().write_failures, 1);
    }

    #[tokio::test]
    async fn test_flush_dirty_persists_nested_edit() {
        let host = Host::in_memory("https://example.test");
        let store = store_on(&host, BackendKind::Script, SyncMode::Manual);
        store.set("a", json!({"n": 1}));
        store.set("b", json!({"n": 2}));
        assert_eq!(store.sync().await.unwrap(), 2);

        store.peek("a").unwrap().set_field("n", json!(10));
        assert!(store.mark_dirty("a"));
        assert!(!store.mark_dirty("missing"));

        assert_eq!(store.flush_dirty().await.unwrap(), 1);
        assert!(store.dirty_keys().is_empty());
        assert_eq!(
            store.backend().get("a", json!(null)).await.unwrap(),
            json!({"n": 10})
        );
    }

    #[tokio::test]
    async fn test_reconcile_inserts_and_merges() {
        let host = Host::in_memory("https://example.test");
        let writer = store_on(&host, BackendKind::Script, SyncMode::Manual);
        let reader = store_on(&host, BackendKind::Script, SyncMode::Manual);

        writer.set("k", json!({"a": {"x": 1}}));
        writer.sync().await.unwrap();

        let first = reader.reconcile().await;
        assert_eq!(first.inserted, 2); // value + watermark
        let held = reader.peek("k").unwrap().get("a").unwrap();

        writer.peek("k").unwrap().get("a").unwrap().set_field("y", json!(2));
        writer.sync().await.unwrap();
        let second = reader.reconcile().await;

        assert_eq!(second.merged, 2);
        assert!(reader.peek("k").unwrap().get("a").unwrap().ptr_eq(&held));
        assert_eq!(held.to_value(), json!({"x": 1, "y": 2}));
        assert_eq!(
            reader.backend().watermark().observed(),
            writer.backend().watermark().observed()
        );
    }

    #[tokio::test]
    async fn test_reconcile_twice_is_stable() {
        let host = Host::in_memory("https://example.test");
        let writer = store_on(&host, BackendKind::Script, SyncMode::Manual);
        let reader = store_on(&host, BackendKind::Script, SyncMode::Manual);
        writer.set("k", json!({"a": [1, {"b": 2}]}));
        writer.sync().await.unwrap();

        reader.reconcile().await;
        let before = reader.snapshot();
        let held = reader.peek("k").unwrap().path(&["a", "1"]).unwrap();
        reader.reconcile().await;

        assert_eq!(reader.snapshot(), before);
        assert!(reader.peek("k").unwrap().path(&["a", "1"]).unwrap().ptr_eq(&held));
    }

    #[tokio::test]
    async fn test_reconcile_skips_malformed() {
        let host = Host::in_memory("https://example.test");
        let store = store_on(&host, BackendKind::Script, SyncMode::Manual);
        host.script_store()
            .unwrap()
            .set_value("bad", "{oops".to_string(), Uuid::new_v4())
            .await
            .unwrap();

        let report = store.reconcile().await;

        assert_eq!(report.skipped, 1);
        assert!(!store.has("bad"));
    }
}
