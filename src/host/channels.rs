//! Cross-context message channels provided by the host.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::host::EVENT_CAPACITY;

// == Broadcast Hub ==
/// Named fire-and-forget multicast channels. Every subscriber of a name
/// receives every message posted on it, its own included.
#[derive(Default)]
pub struct BroadcastHub {
    channels: Mutex<HashMap<String, broadcast::Sender<Value>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens (or joins) the channel called `name`.
    pub fn open(&self, name: &str) -> BroadcastChannel {
        let sender = self
            .channels
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(EVENT_CAPACITY).0)
            .clone();
        BroadcastChannel { sender }
    }
}

#[derive(Clone)]
pub struct BroadcastChannel {
    sender: broadcast::Sender<Value>,
}

impl BroadcastChannel {
    /// Posts a message; returns the number of subscribers that will see it.
    pub fn post_message(&self, message: Value) -> usize {
        self.sender.send(message).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.sender.subscribe()
    }
}

// == Window Bus ==
/// A message tagged with the origin of the window that posted it.
#[derive(Debug, Clone)]
pub struct WindowMessage {
    pub origin: String,
    pub data: Value,
}

/// Point-to-point style messaging visible to every window in the host,
/// whatever script runs there. Payloads must assume they are public.
pub struct WindowBus {
    sender: broadcast::Sender<WindowMessage>,
}

impl WindowBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn post_message(&self, origin: &str, data: Value) {
        let _ = self.sender.send(WindowMessage {
            origin: origin.to_string(),
            data,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WindowMessage> {
        self.sender.subscribe()
    }
}

impl Default for WindowBus {
    fn default() -> Self {
        Self::new()
    }
}
