//! Change Listener Task
//!
//! Turns remote notifications into reconciliation pulls.

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheStore;
use crate::notify::ChangeStream;
use crate::tasks::Invalidate;

/// Spawns a task that reconciles `store` and calls `on_invalidate` for every
/// remote change on `stream`. Changes caused by this context are counted and
/// skipped. The event's own watermark is not trusted: a pull that fails is
/// left for the poll task to retry. The task ends when the stream's source
/// closes.
pub fn spawn_listener_task(
    mut stream: ChangeStream,
    store: CacheStore,
    on_invalidate: Invalidate,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting change listener");

        while let Some(event) = stream.recv().await {
            store.record(|stats| stats.record_notification(event.is_remote));
            if !event.is_remote {
                debug!("ignoring own change of {}", event.key);
                continue;
            }

            let report = store.reconcile().await;
            debug!("remote change of {} reconciled: {:?}", event.key, report);
            on_invalidate();
        }

        info!("Change listener stopped: notification source closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendAdapter, BackendKind};
    use crate::cache::SyncMode;
    use crate::host::Host;
    use crate::notify::{Notifier, NotifyKind};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    fn context(host: &Host) -> (CacheStore, ChangeStream) {
        let tab_id = Uuid::new_v4();
        let notifier = Arc::new(Notifier::new(NotifyKind::Broadcast, tab_id, host, "chan"));
        let backend = Arc::new(BackendAdapter::new(BackendKind::Script, host, "", notifier));
        let stream = ChangeStream::subscribe(
            NotifyKind::Broadcast,
            host,
            tab_id,
            "chan",
            crate::backend::WATERMARK_KEY,
            "",
        )
        .unwrap();
        (CacheStore::new(backend, SyncMode::Auto), stream)
    }

    #[tokio::test]
    async fn test_remote_write_reconciles_and_invalidates() {
        let host = Host::in_memory("https://example.test");
        let (writer, _writer_stream) = context(&host);
        let (reader, reader_stream) = context(&host);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handle = spawn_listener_task(
            reader_stream,
            reader.clone(),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        writer.set("k", json!({"a": 1})).wait().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(reader.get("k", json!({})).to_value(), json!({"a": 1}));
        assert_eq!(reader.stats().notifications_received, 1);
        handle.abort();
    }

    #[tokio::test]
    async fn test_own_write_is_ignored() {
        let host = Host::in_memory("https://example.test");
        let (store, stream) = context(&host);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handle = spawn_listener_task(
            stream,
            store.clone(),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        store.set("k", json!(1)).wait().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let stats = store.stats();
        assert_eq!(stats.notifications_ignored, 1);
        assert_eq!(stats.reconciles, 0);
        handle.abort();
    }
}
