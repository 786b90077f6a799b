//! Inbound reconciliation: raw broker deliveries in, ordered log entries out.
//!
//! Runs as one task consuming the session's event stream. Every delivery
//! becomes exactly one log entry — a payload that fails to decode produces a
//! degraded entry surfacing the raw bytes rather than being dropped.

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use pager_net::SessionEvent;
use pager_shared::types::{Message, MessageOrigin, NotificationEvent};

use crate::events::{emit, preview, ClientEvent};
use crate::log::MessageLog;

/// Hex bytes shown for an undecodable payload before truncating.
const RAW_PREVIEW_BYTES: usize = 32;

/// Consume session events until the session shuts down, appending reconciled
/// messages to the log and mirroring lifecycle changes as client events.
pub(crate) fn spawn(
    mut session_events: broadcast::Receiver<SessionEvent>,
    log: MessageLog,
    events: broadcast::Sender<ClientEvent>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = session_events.recv() => event,
            };

            match event {
                Ok(SessionEvent::MessageReceived(raw)) => {
                    let message = reconcile(raw);
                    log.prepend(message.clone());
                    emit(
                        &events,
                        ClientEvent::MessageArrived {
                            id: message.id,
                            from: message.from,
                            preview: preview(&message.body),
                        },
                    );
                }
                Ok(SessionEvent::Connected) => emit(&events, ClientEvent::Connected),
                Ok(SessionEvent::Disconnected { reason }) => {
                    emit(&events, ClientEvent::Disconnected { reason })
                }
                Ok(SessionEvent::Error { message }) => {
                    emit(&events, ClientEvent::SessionError { message })
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // The log misses what the broadcast queue already shed;
                    // surface that instead of pretending nothing happened.
                    warn!(skipped, "Reconciler lagged behind session events");
                    emit(
                        &events,
                        ClientEvent::SessionError {
                            message: format!("dropped {skipped} session events"),
                        },
                    );
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("Reconciler terminated");
    })
}

/// Turn one raw delivery into a log entry.
fn reconcile(raw: NotificationEvent) -> Message {
    let from = sender_from_topic(&raw.topic);
    let body = decode_body(&raw.payload);
    Message {
        id: Uuid::new_v4(),
        from,
        body,
        timestamp: raw.received_at,
        read: false,
        origin: MessageOrigin::Inbound,
    }
}

/// The sender is the identity segment of the inbox topic. Deliveries on a
/// topic without the expected shape keep the raw topic as the sender.
fn sender_from_topic(topic: &str) -> String {
    match topic.split_once('/') {
        Some((_, name)) if !name.is_empty() => name.to_string(),
        _ => topic.to_string(),
    }
}

/// Best-effort decode of an opaque payload to display text.
fn decode_body(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let shown = &payload[..payload.len().min(RAW_PREVIEW_BYTES)];
            let suffix = if payload.len() > RAW_PREVIEW_BYTES {
                "…"
            } else {
                ""
            };
            format!(
                "[unreadable payload, {} bytes: {}{}]",
                payload.len(),
                hex::encode(shown),
                suffix
            )
        }
    }
}
