//! Sync Coordinator Module
//!
//! Wires the backend, the notification channel and the cache store of one
//! execution context together and drives its lifecycle:
//! `Uninitialized → Loading → Ready`.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::{BackendAdapter, BackendKind, WATERMARK_KEY};
use crate::cache::{CacheStore, ReconcileReport};
use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::host::Host;
use crate::notify::{ChangeStream, Notifier, NotifyKind};
use crate::tasks::{spawn_listener_task, spawn_poll_task, Invalidate};
use crate::view::StoreView;

// == Sync State ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Uninitialized,
    Loading,
    Ready,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Uninitialized => "uninitialized",
            SyncState::Loading => "loading",
            SyncState::Ready => "ready",
        }
    }
}

// == Sync Context ==
/// One execution context's view of the shared storage.
///
/// Background tasks started by [`SyncContext::start`] are aborted by
/// [`SyncContext::shutdown`] or when the context is dropped.
pub struct SyncContext {
    config: Config,
    host: Host,
    tab_id: Uuid,
    notify_kind: NotifyKind,
    store: CacheStore,
    state: watch::Sender<SyncState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncContext {
    /// Selects the backend and notification strategy for `host` and builds
    /// an empty cache. Nothing is read until `start`.
    pub fn new(config: Config, host: Host) -> Self {
        let tab_id = Uuid::new_v4();
        let backend_kind = BackendKind::select(&config.backend_order, &host);
        let notify_kind = config.notify_kind.resolve(backend_kind, &host);

        let notifier = Arc::new(Notifier::new(
            notify_kind,
            tab_id,
            &host,
            &config.channel_name,
        ));
        let backend = Arc::new(BackendAdapter::new(
            backend_kind,
            &host,
            &config.key_prefix,
            notifier,
        ));
        let store = CacheStore::new(backend, config.sync_mode);

        info!(
            "context {} using backend {} with {} notifications ({} sync)",
            tab_id, backend_kind, notify_kind, config.sync_mode
        );

        let (state, _) = watch::channel(SyncState::Uninitialized);
        Self {
            config,
            host,
            tab_id,
            notify_kind,
            store,
            state,
            tasks: Mutex::new(Vec::new()),
        }
    }

    // == Lifecycle ==
    /// Loads the cache from storage, then starts listening for remote
    /// changes and polling the watermark. `on_invalidate` runs after every
    /// reconciliation triggered by another context.
    ///
    /// Can only be called once.
    pub async fn start<F>(&self, on_invalidate: F) -> Result<ReconcileReport>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let previous = self.state.send_replace(SyncState::Loading);
        if previous != SyncState::Uninitialized {
            self.state.send_replace(previous);
            return Err(SyncError::InvalidRequest(format!(
                "context {} already {}",
                self.tab_id,
                previous.as_str()
            )));
        }

        // Subscribed before the initial pull so nothing written meanwhile is missed
        let stream = ChangeStream::subscribe(
            self.notify_kind,
            &self.host,
            self.tab_id,
            &self.config.channel_name,
            WATERMARK_KEY,
            &self.config.key_prefix,
        );

        let report = self.store.reconcile().await;
        self.state.send_replace(SyncState::Ready);
        info!(
            "context {} ready with {} entries",
            self.tab_id,
            self.store.len()
        );

        let on_invalidate: Invalidate = Arc::new(on_invalidate);
        let mut tasks = self.tasks.lock();
        match stream {
            Some(stream) => tasks.push(spawn_listener_task(
                stream,
                self.store.clone(),
                on_invalidate.clone(),
            )),
            None => warn!(
                "context {} has no change notifications, relying on polling",
                self.tab_id
            ),
        }
        tasks.push(spawn_poll_task(
            self.store.clone(),
            self.config.poll_interval(),
            on_invalidate,
        ));

        Ok(report)
    }

    /// Aborts the listener and poll tasks. The cache stays readable.
    pub fn shutdown(&self) {
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        if !tasks.is_empty() {
            info!("context {} stopping {} tasks", self.tab_id, tasks.len());
        }
        for task in tasks {
            task.abort();
        }
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SyncState::Ready
    }

    /// Watches state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Resolves once the initial load has finished.
    pub async fn wait_ready(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as self, so this cannot fail
        let _ = rx.wait_for(|state| *state == SyncState::Ready).await;
    }

    // == Accessors ==
    pub fn tab_id(&self) -> Uuid {
        self.tab_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn view(&self) -> StoreView {
        StoreView::new(self.store.clone())
    }

    pub fn backend(&self) -> &Arc<BackendAdapter> {
        self.store.backend()
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.store.backend().kind()
    }

    pub fn notify_kind(&self) -> NotifyKind {
        self.notify_kind
    }
}

impl Drop for SyncContext {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}
