//! Error types for the synchronized cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Sync Error Enum ==
/// Unified error type for backends, notification channels and the inspection API.
#[derive(Error, Debug)]
pub enum SyncError {
    /// No durable backend could be selected
    #[error("Storage unavailable: no durable backend selected")]
    StorageUnavailable,

    /// A stored value failed to parse as JSON
    #[error("Malformed value stored under key: {key}")]
    MalformedValue {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// No working cross-context notification strategy
    #[error("Notification strategy unavailable: {0}")]
    NotifyUnavailable(String),

    /// The backend refused a write
    #[error("Write rejected: {0}")]
    WriteRejected(String),

    /// The backend's quota would be exceeded by a write
    #[error("Quota exceeded: {needed} bytes needed, quota is {quota} bytes")]
    QuotaExceeded { needed: usize, quota: usize },

    /// Key not present in the cache
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Filesystem failure in a file-backed store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// == IntoResponse Implementation ==
impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let status = match &self {
            SyncError::NotFound(_) => StatusCode::NOT_FOUND,
            SyncError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            SyncError::StorageUnavailable | SyncError::NotifyUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            SyncError::QuotaExceeded { .. } => StatusCode::INSUFFICIENT_STORAGE,
            SyncError::MalformedValue { .. }
            | SyncError::WriteRejected(_)
            | SyncError::Io(_)
            | SyncError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the synchronized cache.
pub type Result<T> = std::result::Result<T, SyncError>;
