//! Send side of the notification channel.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::host::{BroadcastChannel, Host, WindowBus};
use crate::notify::{NotifyKind, NotifyPayload};

/// Announces local writes to sibling contexts.
pub struct Notifier {
    kind: NotifyKind,
    tab_id: Uuid,
    origin: String,
    channel: Option<BroadcastChannel>,
    window: Arc<WindowBus>,
}

impl Notifier {
    /// `kind` must already be resolved against the host and backend.
    pub fn new(kind: NotifyKind, tab_id: Uuid, host: &Host, channel_name: &str) -> Self {
        let channel = match kind {
            NotifyKind::Broadcast => host.broadcast().map(|hub| hub.open(channel_name)),
            _ => None,
        };
        Self {
            kind,
            tab_id,
            origin: host.origin().to_string(),
            channel,
            window: host.window().clone(),
        }
    }

    pub fn kind(&self) -> NotifyKind {
        self.kind
    }

    pub fn tab_id(&self) -> Uuid {
        self.tab_id
    }

    /// Announces that `key` was persisted. Strategies whose backend raises
    /// its own event have nothing to send.
    pub fn notify(&self, key: &str) {
        let payload = NotifyPayload {
            origin_id: self.tab_id,
            key: key.to_string(),
        };

        match self.kind {
            NotifyKind::Broadcast => {
                let Some(channel) = &self.channel else {
                    return;
                };
                match serde_json::to_value(&payload) {
                    Ok(message) => {
                        let receivers = channel.post_message(message);
                        debug!("broadcast change of {} to {} receivers", key, receivers);
                    }
                    Err(e) => debug!("could not encode notification for {}: {}", key, e),
                }
            }
            NotifyKind::MessagePassing => match serde_json::to_value(&payload) {
                Ok(message) => {
                    self.window.post_message(&self.origin, message);
                    debug!("posted change of {} to window bus", key);
                }
                Err(e) => debug!("could not encode notification for {}: {}", key, e),
            },
            NotifyKind::ChangeListener | NotifyKind::StorageEvent | NotifyKind::None => {}
        }
    }
}
