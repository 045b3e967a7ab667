//! API Routes
//!
//! Configures the Axum router with all inspection endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    get_entry_handler, health_handler, list_entries_handler, put_entry_handler,
    reconcile_handler, stats_handler, status_handler, sync_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/stats", get(stats_handler))
        .route("/entries", get(list_entries_handler))
        .route(
            "/entries/:key",
            get(get_entry_handler).put(put_entry_handler),
        )
        .route("/sync", post(sync_handler))
        .route("/reconcile", post(reconcile_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
