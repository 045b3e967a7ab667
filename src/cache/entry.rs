//! Cache Entry Module
//!
//! A cached value plus the version bookkeeping used for dirty tracking.

use crate::cache::Node;

// == Cache Entry ==
/// Every local modification bumps `version`; a successful persistence
/// records the version it wrote. The entry is dirty while they differ.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Live value handle
    pub node: Node,
    version: u64,
    persisted: u64,
}

impl CacheEntry {
    // == Constructors ==
    /// An entry that matches durable storage (fetched by reconciliation).
    pub fn clean(node: Node) -> Self {
        Self {
            node,
            version: 0,
            persisted: 0,
        }
    }

    /// An entry created locally and not yet persisted.
    pub fn dirty(node: Node) -> Self {
        Self {
            node,
            version: 1,
            persisted: 0,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_dirty(&self) -> bool {
        self.version != self.persisted
    }

    /// Records a local modification and returns the new version.
    pub fn touch(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    /// Records that `version` reached durable storage. A newer local edit
    /// made while the write was in flight keeps the entry dirty.
    pub fn mark_persisted(&mut self, version: u64) {
        self.persisted = self.persisted.max(version);
    }

    /// The entry now mirrors durable storage exactly.
    pub fn mark_clean(&mut self) {
        self.persisted = self.version;
    }
}
