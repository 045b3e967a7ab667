//! Request and Response models for the inspection API
//!
//! DTOs used for serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{validate_key, PutEntryRequest};
pub use responses::{
    EntriesResponse, EntryResponse, HealthResponse, StatsResponse, StatusResponse, SyncResponse,
    WriteResponse,
};
