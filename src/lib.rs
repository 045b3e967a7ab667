//! tabsync - a synchronized persistent key-value cache
//!
//! Every execution context keeps an in-memory mirror of a shared durable
//! store. Writes persist through the best available backend, sibling
//! contexts are told about them, and reconciliation merges remote changes
//! into the mirror without replacing values application code still holds.

pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod host;
pub mod models;
pub mod notify;
pub mod tasks;
pub mod view;

pub use api::AppState;
pub use backend::{BackendAdapter, BackendKind, WATERMARK_KEY};
pub use cache::{CacheStore, Node, SyncMode};
pub use config::Config;
pub use coordinator::{SyncContext, SyncState};
pub use error::{Result, SyncError};
pub use host::Host;
pub use notify::NotifyKind;
pub use view::{FieldMap, StoreView};
