//! Request DTOs for the inspection API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;
use serde_json::Value;

use crate::backend::WATERMARK_KEY;
use crate::view::is_reserved;

/// Longest key accepted over HTTP
pub const MAX_KEY_LEN: usize = 256;

/// Request body for PUT /entries/:key
#[derive(Debug, Clone, Deserialize)]
pub struct PutEntryRequest {
    /// Any JSON value, including objects and arrays
    pub value: Value,
}

/// Checks a key taken from the request path.
///
/// Returns an error message if validation fails, None if valid.
pub fn validate_key(key: &str) -> Option<String> {
    if key.is_empty() {
        return Some("Key cannot be empty".to_string());
    }
    if key.len() > MAX_KEY_LEN {
        return Some(format!(
            "Key exceeds maximum length of {} characters",
            MAX_KEY_LEN
        ));
    }
    if key == WATERMARK_KEY || is_reserved(key) {
        return Some(format!("Key '{}' is reserved", key));
    }
    None
}
