//! The seam between the session layer and a concrete broker transport.
//!
//! A transport turns one `connect()` call into one live connection: a typed
//! command channel going down and an event channel coming back. The session
//! owns reconnection; a transport connection is single-use and reports its
//! own death with [`TransportEvent::Closed`].

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use pager_shared::error::ConnectionError;

/// Commands sent *into* a live transport connection.
///
/// Every command carries an ack so failures surface to the issuing caller
/// instead of vanishing. The ack reports transport-local success only: for
/// publish that means the payload was enqueued, not delivered.
#[derive(Debug)]
pub enum TransportCommand {
    Subscribe {
        topic: String,
        ack: oneshot::Sender<Result<(), String>>,
    },
    Unsubscribe {
        topic: String,
        ack: oneshot::Sender<Result<(), String>>,
    },
    Publish {
        topic: String,
        payload: Bytes,
        ack: oneshot::Sender<Result<(), String>>,
    },
}

/// Events surfaced *from* a live transport connection.
#[derive(Debug)]
pub enum TransportEvent {
    /// A message was delivered on a subscribed topic.
    Message { topic: String, payload: Bytes },
    /// The connection died. No further events follow.
    Closed { reason: String },
}

/// One live connection to the broker.
pub struct TransportConn {
    pub commands: mpsc::Sender<TransportCommand>,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// A factory for broker connections.
///
/// Implementations must ack commands without waiting on the event channel's
/// capacity, so a session that is mid-operation can never deadlock the
/// delivery path.
#[async_trait]
pub trait BrokerTransport: Send + Sync + 'static {
    async fn connect(&self) -> Result<TransportConn, ConnectionError>;
}
