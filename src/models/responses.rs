//! Response DTOs for the inspection API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::cache::SyncStats;
use crate::coordinator::SyncContext;

/// Response body for GET /entries/:key
#[derive(Debug, Clone, Serialize)]
pub struct EntryResponse {
    pub key: String,
    pub value: Value,
    /// Modified locally and not yet persisted
    pub dirty: bool,
}

/// Response body for GET /entries
#[derive(Debug, Clone, Serialize)]
pub struct EntriesResponse {
    pub keys: Vec<String>,
    pub count: usize,
}

impl EntriesResponse {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            count: keys.len(),
            keys,
        }
    }
}

/// Response body for PUT /entries/:key
#[derive(Debug, Clone, Serialize)]
pub struct WriteResponse {
    /// Success message
    pub message: String,
    pub key: String,
    /// False in manual sync mode, where the write waits for POST /sync
    pub persisted: bool,
}

impl WriteResponse {
    pub fn new(key: impl Into<String>, persisted: bool) -> Self {
        let key = key.into();
        let message = if persisted {
            format!("Key '{}' stored and persisted", key)
        } else {
            format!("Key '{}' stored, pending sync", key)
        };
        Self {
            message,
            key,
            persisted,
        }
    }
}

/// Response body for POST /sync
#[derive(Debug, Clone, Serialize)]
pub struct SyncResponse {
    /// Number of keys written to the backend
    pub persisted: usize,
}

/// Response body for GET /status
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub state: String,
    pub tab_id: Uuid,
    pub backend: String,
    pub notify: String,
    pub sync_mode: String,
    /// Newest watermark written or observed by this context
    pub watermark: i64,
}

impl StatusResponse {
    pub fn from_context(context: &SyncContext) -> Self {
        Self {
            state: context.state().as_str().to_string(),
            tab_id: context.tab_id(),
            backend: context.backend_kind().to_string(),
            notify: context.notify_kind().to_string(),
            sync_mode: context.store().mode().to_string(),
            watermark: context.backend().watermark().observed(),
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: SyncStats,
    /// writes / (writes + write_failures)
    pub write_success_rate: f64,
    pub dirty_entries: usize,
}

impl StatsResponse {
    pub fn new(stats: SyncStats, dirty_entries: usize) -> Self {
        Self {
            write_success_rate: stats.write_success_rate(),
            stats,
            dirty_entries,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
