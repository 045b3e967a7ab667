//! Cache Module
//!
//! The in-memory mirror of durable storage, its reference-preserving
//! reconciliation, and its read/write contract.

mod entry;
mod merge;
mod node;
mod stats;
mod store;


use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

// Re-export public types
pub use entry::CacheEntry;
pub use merge::merge;
pub use node::Node;
pub use stats::SyncStats;
pub use store::{CacheStore, PendingWrite, ReconcileReport};

// == Sync Mode ==
/// When cache writes reach the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Writes stay in the cache until `sync` or `flush_dirty`
    Manual,
    /// Every `set` starts persisting immediately
    Auto,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Manual => f.write_str("manual"),
            SyncMode::Auto => f.write_str("auto"),
        }
    }
}

impl FromStr for SyncMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(SyncMode::Manual),
            "auto" => Ok(SyncMode::Auto),
            other => Err(SyncError::InvalidRequest(format!(
                "unknown sync mode: {}",
                other
            ))),
        }
    }
}
