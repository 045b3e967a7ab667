//! tabsync - standalone context with an inspection API
//!
//! Runs one synchronized context in this process and serves its cache over
//! HTTP. Processes sharing a `STORE_PATH` see each other's writes.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tabsync::api::{create_router, AppState};
use tabsync::{Config, Host, SyncContext};

/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the host and the context, then load the cache
/// 4. Start the HTTP server on the configured port
/// 5. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tabsync=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting tabsync context");

    let config = Config::from_env();
    info!(
        "Configuration loaded: backends={:?}, notify={}, sync_mode={}, poll_interval={}ms, port={}",
        config.backend_order,
        config.notify_kind,
        config.sync_mode,
        config.poll_interval_ms,
        config.server_port
    );

    let host = Host::from_config(&config);
    let port = config.server_port;
    let context = Arc::new(SyncContext::new(config, host));

    let tab_id = context.tab_id();
    let report = context
        .start(move || info!("context {} invalidated by a remote change", tab_id))
        .await
        .context("failed to start context")?;
    info!("Initial load finished: {:?}", report);

    let app = create_router(AppState::new(context.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(context))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then stops the context's
/// background tasks.
async fn shutdown_signal(context: Arc<SyncContext>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    context.shutdown();
    warn!("Background tasks aborted");
}
