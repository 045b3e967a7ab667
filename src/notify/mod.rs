//! Notification Channel Module
//!
//! Tells sibling contexts that a key changed, using one of four mutually
//! exclusive strategies chosen at startup. The polling fallback in
//! `tasks::poll` backs every strategy up.

mod listener;
mod notifier;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

pub use listener::ChangeStream;
pub use notifier::Notifier;

use crate::backend::BackendKind;
use crate::error::SyncError;
use crate::host::Host;

// == Notify Kind ==
/// Cross-context notification strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyKind {
    /// Same-origin multicast carrying the sender's tab identity
    Broadcast,
    /// The script store's own value-change events
    ChangeListener,
    /// Window messages visible to everything in the host
    MessagePassing,
    /// The origin store's own storage events
    StorageEvent,
    /// No cross-context notification, polling only
    None,
}

impl NotifyKind {
    /// Downgrades the requested strategy to one that can work with the
    /// host and the selected backend, warning when cross-context consistency
    /// falls back to polling alone.
    pub fn resolve(self, backend: BackendKind, host: &Host) -> NotifyKind {
        let unavailable = match self {
            NotifyKind::Broadcast if host.broadcast().is_none() => {
                Some("host has no broadcast channels")
            }
            NotifyKind::ChangeListener if backend != BackendKind::Script => {
                Some("value-change listeners need the script store backend")
            }
            NotifyKind::StorageEvent if backend != BackendKind::Origin => {
                Some("storage events need the origin store backend")
            }
            _ => None,
        };

        let resolved = match unavailable {
            Some(reason) => {
                let err = SyncError::NotifyUnavailable(format!("{}: {}", self, reason));
                warn!("{}; relying on the polling fallback", err);
                NotifyKind::None
            }
            None => self,
        };

        match (backend, resolved) {
            (BackendKind::None, kind) if kind != NotifyKind::None => warn!(
                "notification strategy {} selected without a durable backend; cross-context consistency cannot be guaranteed",
                kind
            ),
            (kind, NotifyKind::None) if kind != BackendKind::None => warn!(
                "backend {} selected without a notification strategy; cross-context consistency cannot be guaranteed until the next poll",
                kind
            ),
            _ => {}
        }

        resolved
    }
}

impl fmt::Display for NotifyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NotifyKind::Broadcast => "broadcast",
            NotifyKind::ChangeListener => "change_listener",
            NotifyKind::MessagePassing => "message_passing",
            NotifyKind::StorageEvent => "storage_event",
            NotifyKind::None => "none",
        };
        f.write_str(name)
    }
}

impl FromStr for NotifyKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "broadcast" | "broadcastchannel" => Ok(NotifyKind::Broadcast),
            "change_listener" | "listener" => Ok(NotifyKind::ChangeListener),
            "message_passing" | "postmessage" => Ok(NotifyKind::MessagePassing),
            "storage_event" | "storage" => Ok(NotifyKind::StorageEvent),
            "none" => Ok(NotifyKind::None),
            other => Err(SyncError::InvalidRequest(format!(
                "unknown notification strategy: {}",
                other
            ))),
        }
    }
}

// == Wire Payload ==
/// What travels over the broadcast and message-passing strategies. Values
/// are deliberately left out so timing data never leaves the writing context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyPayload {
    pub origin_id: Uuid,
    pub key: String,
}

// == Change Event ==
/// A change as seen by the receiving context.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    /// False when the event was caused by this context's own write
    pub is_remote: bool,
}

impl ChangeEvent {
    pub fn remote(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            old_value: None,
            new_value: None,
            is_remote: true,
        }
    }
}
