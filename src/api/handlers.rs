//! API Handlers
//!
//! HTTP request handlers for each inspection endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use crate::cache::ReconcileReport;
use crate::coordinator::SyncContext;
use crate::error::{Result, SyncError};
use crate::models::{
    validate_key, EntriesResponse, EntryResponse, HealthResponse, PutEntryRequest, StatsResponse,
    StatusResponse, SyncResponse, WriteResponse,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub context: Arc<SyncContext>,
}

impl AppState {
    pub fn new(context: Arc<SyncContext>) -> Self {
        Self { context }
    }
}

/// Handler for GET /entries/:key
pub async fn get_entry_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<EntryResponse>> {
    let store = state.context.store();
    let node = store
        .peek(&key)
        .ok_or_else(|| SyncError::NotFound(key.clone()))?;

    Ok(Json(EntryResponse {
        value: node.to_value(),
        dirty: store.is_dirty(&key),
        key,
    }))
}

/// Handler for PUT /entries/:key
///
/// In auto sync mode the response is sent once the backend write finished.
pub async fn put_entry_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<PutEntryRequest>,
) -> Result<Json<WriteResponse>> {
    if let Some(error_msg) = validate_key(&key) {
        return Err(SyncError::InvalidRequest(error_msg));
    }

    let pending = state.context.store().set(&key, req.value);
    let persisted = !pending.is_deferred();
    pending.wait().await?;

    Ok(Json(WriteResponse::new(key, persisted)))
}

/// Handler for GET /entries
pub async fn list_entries_handler(State(state): State<AppState>) -> Json<EntriesResponse> {
    Json(EntriesResponse::new(state.context.store().keys()))
}

/// Handler for POST /sync
pub async fn sync_handler(State(state): State<AppState>) -> Result<Json<SyncResponse>> {
    let persisted = state.context.store().sync().await?;
    Ok(Json(SyncResponse { persisted }))
}

/// Handler for POST /reconcile
pub async fn reconcile_handler(State(state): State<AppState>) -> Json<ReconcileReport> {
    Json(state.context.store().reconcile().await)
}

/// Handler for GET /status
pub async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse::from_context(&state.context))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let store = state.context.store();
    Json(StatsResponse::new(store.stats(), store.dirty_keys().len()))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
