//! API Module
//!
//! HTTP handlers and routing for inspecting one context's cache.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `GET /status` - Lifecycle state, backend and notification strategy
//! - `GET /stats` - Synchronization counters
//! - `GET /entries` - Cached keys
//! - `GET /entries/:key` - One cached value
//! - `PUT /entries/:key` - Write a value through the cache
//! - `POST /sync` - Persist every cached key
//! - `POST /reconcile` - Pull every key from storage

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
