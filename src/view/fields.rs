//! Fixed field-to-key bindings.
//!
//! Application code names the handful of records it keeps (for example the
//! `timekeeping` tree) once, then reads, writes and flushes them by field
//! instead of intercepting arbitrary nested access.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::cache::{CacheStore, Node, PendingWrite};
use crate::error::Result;

// == Field Map Builder ==
#[derive(Debug, Default)]
pub struct FieldMapBuilder {
    bindings: BTreeMap<String, Binding>,
}

#[derive(Debug, Clone)]
struct Binding {
    key: String,
    default: Value,
}

impl FieldMapBuilder {
    /// Binds `name` to store key `key`; reads of an absent key yield `{}`.
    pub fn field(self, name: &str, key: &str) -> Self {
        self.field_with_default(name, key, Value::Object(Default::default()))
    }

    pub fn field_with_default(mut self, name: &str, key: &str, default: Value) -> Self {
        self.bindings.insert(
            name.to_string(),
            Binding {
                key: key.to_string(),
                default,
            },
        );
        self
    }

    pub fn build(self, store: CacheStore) -> FieldMap {
        FieldMap {
            store,
            bindings: self.bindings,
        }
    }
}

// == Field Map ==
pub struct FieldMap {
    store: CacheStore,
    bindings: BTreeMap<String, Binding>,
}

impl FieldMap {
    pub fn builder() -> FieldMapBuilder {
        FieldMapBuilder::default()
    }

    /// Names of every bound field.
    pub fn names(&self) -> Vec<&str> {
        self.bindings.keys().map(String::as_str).collect()
    }

    /// Handle on a bound field, `None` for unknown names.
    pub fn field(&self, name: &str) -> Option<Field<'_>> {
        self.bindings.get(name).map(|binding| Field {
            store: &self.store,
            binding,
        })
    }

    /// Persists every bound field marked dirty.
    pub async fn flush(&self) -> Result<usize> {
        self.store.flush_dirty().await
    }
}

// == Field ==
pub struct Field<'a> {
    store: &'a CacheStore,
    binding: &'a Binding,
}

impl Field<'_> {
    pub fn key(&self) -> &str {
        &self.binding.key
    }

    /// Live value of the field, created from its default when absent so
    /// nested edits have somewhere to land.
    pub fn get(&self) -> Node {
        self.store
            .get_or_insert(&self.binding.key, self.binding.default.clone())
    }

    pub fn set(&self, value: Value) -> PendingWrite {
        self.store.set(&self.binding.key, value)
    }

    /// Records a nested edit for the next flush.
    pub fn mark_dirty(&self) -> bool {
        self.store.mark_dirty(&self.binding.key)
    }

    pub fn is_dirty(&self) -> bool {
        self.store.is_dirty(&self.binding.key)
    }
}
