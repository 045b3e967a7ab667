//! Transparent Interception Module
//!
//! A shallow, object-shaped view over the cache store: reading a name reads
//! the top-level key, writing a name goes through the store's `set`. Nested
//! edits made through returned nodes are not seen by the store until the
//! owning key is marked dirty and flushed (see `FieldMap`).

mod fields;

use serde_json::Value;
use tracing::warn;

pub use fields::{Field, FieldMap, FieldMapBuilder};

use crate::cache::{CacheStore, Node, PendingWrite};

/// Reserved name resolving to a snapshot of the whole cache
pub const RESERVED_CACHE: &str = "@cache";
/// Reserved name resolving to the list of cached keys
pub const RESERVED_KEYS: &str = "@keys";

pub fn is_reserved(name: &str) -> bool {
    name == RESERVED_CACHE || name == RESERVED_KEYS
}

// == Store View ==
#[derive(Clone)]
pub struct StoreView {
    store: CacheStore,
}

impl StoreView {
    pub fn new(store: CacheStore) -> Self {
        Self { store }
    }

    /// The store behind the view, for the raw get/set/keys/sync calls.
    pub fn raw(&self) -> &CacheStore {
        &self.store
    }

    /// Reads `name`. Absent keys read as `None` and are not created.
    /// Reserved names bypass the cache entries.
    pub fn get(&self, name: &str) -> Option<Node> {
        match name {
            RESERVED_CACHE => Some(Node::new(self.store.snapshot())),
            RESERVED_KEYS => Some(Node::new(Value::from(self.store.keys()))),
            _ => self.store.peek(name),
        }
    }

    /// Writes `name` through the store and returns the written value.
    /// Reserved names cannot be written and come back unchanged.
    pub fn set(&self, name: &str, value: Value) -> Node {
        self.write(name, value).into_node()
    }

    /// Like `set`, exposing the persistence handle.
    pub fn write(&self, name: &str, value: Value) -> Written {
        if is_reserved(name) {
            warn!("ignoring write to reserved name {}", name);
            return Written::Ignored(Node::new(value));
        }
        Written::Stored(self.store.set(name, value))
    }

    /// Reads `name`, creating it from `default` when absent.
    pub fn get_or_insert(&self, name: &str, default: Value) -> Node {
        match self.get(name) {
            Some(node) => node,
            None => self.set(name, default),
        }
    }
}

// == Written ==
pub enum Written {
    Stored(PendingWrite),
    Ignored(Node),
}

impl Written {
    pub fn into_node(self) -> Node {
        match self {
            Written::Stored(write) => write.into_node(),
            Written::Ignored(node) => node,
        }
    }

    /// The persistence handle, if the write reached the store.
    pub fn pending(self) -> Option<PendingWrite> {
        match self {
            Written::Stored(write) => Some(write),
            Written::Ignored(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendAdapter, BackendKind};
    use crate::cache::SyncMode;
    use crate::host::Host;
    use crate::notify::{Notifier, NotifyKind};
    use serde_json::json;
    use std::sync::Arc;
    use uuid::Uuid;

    fn view(mode: SyncMode) -> StoreView {
        let host = Host::in_memory("https://example.test");
        let notifier = Arc::new(Notifier::new(NotifyKind::None, Uuid::new_v4(), &host, "chan"));
        let backend = Arc::new(BackendAdapter::new(BackendKind::Script, &host, "", notifier));
        StoreView::new(CacheStore::new(backend, mode))
    }

    #[test]
    fn test_absent_read_does_not_create() {
        let view = view(SyncMode::Manual);
        assert!(view.get("timekeeping").is_none());
        assert!(!view.raw().has("timekeeping"));
    }

    #[test]
    fn test_write_goes_through_store() {
        let view = view(SyncMode::Manual);

        let written = view.set("timekeeping", json!({"2023": {}}));

        assert_eq!(written.to_value(), json!({"2023": {}}));
        assert!(view.get("timekeeping").unwrap().ptr_eq(&written));
        assert!(view.raw().is_dirty("timekeeping"));
    }

    #[test]
    fn test_reserved_names_bypass_entries() {
        let view = view(SyncMode::Manual);
        view.set("a", json!(1));
        view.set("b", json!(2));

        assert_eq!(view.get(RESERVED_KEYS).unwrap().to_value(), json!(["a", "b"]));
        assert_eq!(
            view.get(RESERVED_CACHE).unwrap().to_value(),
            json!({"a": 1, "b": 2})
        );

        let ignored = view.write(RESERVED_KEYS, json!("nope"));
        assert!(ignored.pending().is_none());
        assert!(!view.raw().has(RESERVED_KEYS));
    }

    #[test]
    fn test_get_or_insert() {
        let view = view(SyncMode::Manual);
        let first = view.get_or_insert("t", json!({}));
        first.set_field("x", json!(1));

        let second = view.get_or_insert("t", json!({}));
        assert!(second.ptr_eq(&first));
        assert_eq!(second.to_value(), json!({"x": 1}));
    }

    #[tokio::test]
    async fn test_auto_write_persists() {
        let view = view(SyncMode::Auto);

        let pending = view.write("k", json!([1])).pending().unwrap();
        pending.wait().await.unwrap();

        assert_eq!(
            view.raw().backend().get("k", json!(null)).await.unwrap(),
            json!([1])
        );
    }

    #[tokio::test]
    async fn test_watermark_key_write_is_refused() {
        let view = view(SyncMode::Auto);

        let pending = view
            .write(crate::backend::WATERMARK_KEY, json!(1))
            .pending()
            .unwrap();

        assert!(pending.is_rejected());
        assert!(pending.wait().await.is_err());
        assert!(view.get(crate::backend::WATERMARK_KEY).is_none());
        assert_eq!(view.raw().backend().read_watermark().await.unwrap(), None);
    }
}
