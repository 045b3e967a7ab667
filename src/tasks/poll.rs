//! Polling Fallback Task
//!
//! Periodically compares the durable watermark against the newest one this
//! context has seen, and pulls when storage moved without a notification.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::error::SyncError;
use crate::tasks::Invalidate;

/// Spawns a task that runs [`poll_once`] every `interval`.
///
/// Returns a JoinHandle so the owning context can abort the task when it
/// shuts down.
///
/// # Example
/// ```ignore
/// let handle = spawn_poll_task(store.clone(), Duration::from_secs(60), on_invalidate);
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_poll_task(
    store: CacheStore,
    interval: Duration,
    on_invalidate: Invalidate,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting watermark poll with interval of {:?}", interval);

        loop {
            tokio::time::sleep(interval).await;

            if poll_once(&store, &on_invalidate).await {
                debug!("Poll found newer storage, cache refreshed");
            }
        }
    })
}

/// One polling round. Reconciles and invalidates when the durable watermark
/// is newer than the last reconciled one; returns whether that happened.
pub async fn poll_once(store: &CacheStore, on_invalidate: &Invalidate) -> bool {
    let refreshed = match store.backend().read_watermark().await {
        Ok(Some(stamp)) if store.backend().watermark().is_behind(stamp) => {
            let report = store.reconcile().await;
            debug!("watermark advanced to {}: {:?}", stamp, report);
            on_invalidate();
            true
        }
        Ok(_) => false,
        Err(SyncError::StorageUnavailable) => false,
        Err(e) => {
            warn!("watermark poll failed: {}", e);
            false
        }
    };

    store.record(|stats| stats.record_poll(refreshed));
    refreshed
}
