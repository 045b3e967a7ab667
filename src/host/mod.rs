//! Host Module
//!
//! The environment shared by every execution context of one origin: the
//! durable stores and the cross-context channels a context checks at startup.
//!
//! A capability is available when the host was built with it; contexts never
//! share anything else.

mod channels;
mod origin_store;
mod script_store;

use std::sync::Arc;

pub use channels::{BroadcastChannel, BroadcastHub, WindowBus, WindowMessage};
pub use origin_store::{OriginStore, StorageEvent};
pub use script_store::{ScriptStore, ValueChange};

use crate::config::{Config, DEFAULT_QUOTA_BYTES};

/// Buffered events per channel before slow receivers start lagging
pub const EVENT_CAPACITY: usize = 256;

// == Host ==
#[derive(Clone)]
pub struct Host {
    origin: String,
    script_store: Option<Arc<ScriptStore>>,
    origin_store: Option<Arc<OriginStore>>,
    broadcast: Option<Arc<BroadcastHub>>,
    window: Arc<WindowBus>,
}

impl Host {
    pub fn builder(origin: impl Into<String>) -> HostBuilder {
        HostBuilder {
            origin: origin.into(),
            script_store: None,
            origin_store: None,
            broadcast: None,
        }
    }

    /// A host offering every capability, all in memory.
    pub fn in_memory(origin: impl Into<String>) -> Self {
        Self::builder(origin)
            .script_store(ScriptStore::in_memory(DEFAULT_QUOTA_BYTES))
            .origin_store(OriginStore::new(DEFAULT_QUOTA_BYTES))
            .broadcast()
            .build()
    }

    /// The host a standalone process runs in. The script store is file-backed
    /// when `store_path` is configured, so sibling processes share it.
    pub fn from_config(config: &Config) -> Self {
        let script_store = match &config.store_path {
            Some(path) => ScriptStore::open(path, config.store_quota_bytes),
            None => ScriptStore::in_memory(config.store_quota_bytes),
        };
        Self::builder("local")
            .script_store(script_store)
            .origin_store(OriginStore::new(DEFAULT_QUOTA_BYTES))
            .broadcast()
            .build()
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn script_store(&self) -> Option<&Arc<ScriptStore>> {
        self.script_store.as_ref()
    }

    pub fn origin_store(&self) -> Option<&Arc<OriginStore>> {
        self.origin_store.as_ref()
    }

    pub fn broadcast(&self) -> Option<&Arc<BroadcastHub>> {
        self.broadcast.as_ref()
    }

    pub fn window(&self) -> &Arc<WindowBus> {
        &self.window
    }
}

// == Host Builder ==
pub struct HostBuilder {
    origin: String,
    script_store: Option<Arc<ScriptStore>>,
    origin_store: Option<Arc<OriginStore>>,
    broadcast: Option<Arc<BroadcastHub>>,
}

impl HostBuilder {
    pub fn script_store(mut self, store: ScriptStore) -> Self {
        self.script_store = Some(Arc::new(store));
        self
    }

    pub fn origin_store(mut self, store: OriginStore) -> Self {
        self.origin_store = Some(Arc::new(store));
        self
    }

    pub fn broadcast(mut self) -> Self {
        self.broadcast = Some(Arc::new(BroadcastHub::new()));
        self
    }

    pub fn build(self) -> Host {
        Host {
            origin: self.origin,
            script_store: self.script_store,
            origin_store: self.origin_store,
            broadcast: self.broadcast,
            window: Arc::new(WindowBus::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_host_has_no_capabilities() {
        let host = Host::builder("https://example.test").build();
        assert!(host.script_store().is_none());
        assert!(host.origin_store().is_none());
        assert!(host.broadcast().is_none());
        assert_eq!(host.origin(), "https://example.test");
    }

    #[test]
    fn test_clones_share_capabilities() {
        let host = Host::in_memory("https://example.test");
        let clone = host.clone();
        assert!(Arc::ptr_eq(
            host.script_store().unwrap(),
            clone.script_store().unwrap()
        ));
    }
}
