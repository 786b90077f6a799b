use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Notifications for transient UI: status badges, toasts, unread markers.
///
/// Serializable so a presentation shell can forward them to its frontend
/// as-is.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientEvent {
    Connected,
    Disconnected { reason: String },
    SessionError { message: String },
    MessageArrived { id: Uuid, from: String, preview: String },
    MessageSent { to: String },
}

/// How many characters of a message body a toast preview carries.
const PREVIEW_LEN: usize = 80;

pub(crate) fn preview(body: &str) -> String {
    if body.chars().count() <= PREVIEW_LEN {
        body.to_string()
    } else {
        let cut: String = body.chars().take(PREVIEW_LEN).collect();
        format!("{cut}…")
    }
}

pub(crate) fn emit(events: &broadcast::Sender<ClientEvent>, event: ClientEvent) {
    // Err just means nobody is listening right now.
    let _ = events.send(event);
}
