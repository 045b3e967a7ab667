//! Receive side of the notification channel.
//!
//! Every strategy is normalized into a stream of `ChangeEvent`s. Strategies
//! driven by a backend's native events only react to the watermark key, which
//! each logical write updates exactly once.

use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::host::{Host, StorageEvent, ValueChange, WindowMessage};
use crate::notify::{ChangeEvent, NotifyKind, NotifyPayload};

enum Source {
    Broadcast(broadcast::Receiver<Value>),
    ChangeListener(broadcast::Receiver<ValueChange>),
    Window {
        rx: broadcast::Receiver<WindowMessage>,
        origin: String,
    },
    Storage {
        rx: broadcast::Receiver<StorageEvent>,
        prefix: String,
    },
}

// == Change Stream ==
pub struct ChangeStream {
    tab_id: Uuid,
    watermark_key: String,
    source: Source,
}

impl ChangeStream {
    /// Subscribes to the strategy's source. Returns `None` for
    /// `NotifyKind::None` or when the host lacks the capability.
    pub fn subscribe(
        kind: NotifyKind,
        host: &Host,
        tab_id: Uuid,
        channel_name: &str,
        watermark_key: &str,
        key_prefix: &str,
    ) -> Option<Self> {
        let source = match kind {
            NotifyKind::Broadcast => {
                Source::Broadcast(host.broadcast()?.open(channel_name).subscribe())
            }
            NotifyKind::ChangeListener => Source::ChangeListener(host.script_store()?.subscribe()),
            NotifyKind::MessagePassing => Source::Window {
                rx: host.window().subscribe(),
                origin: host.origin().to_string(),
            },
            NotifyKind::StorageEvent => Source::Storage {
                rx: host.origin_store()?.subscribe(),
                prefix: key_prefix.to_string(),
            },
            NotifyKind::None => return None,
        };

        Some(Self {
            tab_id,
            watermark_key: watermark_key.to_string(),
            source,
        })
    }

    /// Waits for the next relevant change. Returns `None` once the source closes.
    ///
    /// A receiver that fell behind cannot know what it missed, so lagging is
    /// reported as a remote change of the watermark.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            let event = match &mut self.source {
                Source::Broadcast(rx) => match recv_or_lag(rx).await? {
                    Some(message) => from_payload(message, self.tab_id),
                    None => Some(ChangeEvent::remote(&self.watermark_key)),
                },
                Source::ChangeListener(rx) => match recv_or_lag(rx).await? {
                    Some(change) if change.key == self.watermark_key => Some(ChangeEvent {
                        key: change.key,
                        old_value: parse_raw(change.old_value.as_deref()),
                        new_value: parse_raw(change.new_value.as_deref()),
                        is_remote: change.writer != self.tab_id,
                    }),
                    Some(_) => None,
                    None => Some(ChangeEvent::remote(&self.watermark_key)),
                },
                Source::Window { rx, origin } => match recv_or_lag(rx).await? {
                    // Anything else on the bus belongs to someone else
                    Some(message) if message.origin == *origin => {
                        from_payload(message.data, self.tab_id)
                    }
                    Some(_) => None,
                    None => Some(ChangeEvent::remote(&self.watermark_key)),
                },
                Source::Storage { rx, prefix } => match recv_or_lag(rx).await? {
                    Some(event) => match event.key.strip_prefix(prefix.as_str()) {
                        Some(key) if key == self.watermark_key => Some(ChangeEvent {
                            key: key.to_string(),
                            old_value: parse_raw(event.old_value.as_deref()),
                            new_value: parse_raw(event.new_value.as_deref()),
                            is_remote: event.writer != self.tab_id,
                        }),
                        _ => None,
                    },
                    None => Some(ChangeEvent::remote(&self.watermark_key)),
                },
            };

            if let Some(event) = event {
                return Some(event);
            }
        }
    }
}

/// `Some(Some(msg))` for a message, `Some(None)` after lagging, `None` once closed.
async fn recv_or_lag<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Option<Option<T>> {
    match rx.recv().await {
        Ok(message) => Some(Some(message)),
        Err(RecvError::Lagged(skipped)) => {
            warn!("notification receiver lagged, {} events skipped", skipped);
            Some(None)
        }
        Err(RecvError::Closed) => None,
    }
}

fn from_payload(message: Value, tab_id: Uuid) -> Option<ChangeEvent> {
    match serde_json::from_value::<NotifyPayload>(message) {
        Ok(payload) => Some(ChangeEvent {
            key: payload.key,
            old_value: None,
            new_value: None,
            is_remote: payload.origin_id != tab_id,
        }),
        Err(e) => {
            debug!("ignoring foreign message: {}", e);
            None
        }
    }
}

fn parse_raw(raw: Option<&str>) -> Option<Value> {
    raw.and_then(|s| serde_json::from_str(s).ok())
}
