//! Outbound sends: one entry point, two delivery strategies.
//!
//! Which strategy runs is fixed by deployment configuration, never decided
//! per call. Direct publish synthesizes an optimistic local echo, because a
//! publish to another identity's topic is not echoed back by the broker.
//! The relay is the source of truth for its own deliveries, so the relay
//! strategy never echoes.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use pager_net::Session;
use pager_shared::constants::LOCAL_ECHO_SENDER;
use pager_shared::error::{SendError, ValidationError};
use pager_shared::types::{Message, MessageOrigin, Topic, TopicNamespace};

use crate::events::{emit, ClientEvent};
use crate::log::MessageLog;
use crate::relay::RelaySender;

/// How a composed message leaves the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStrategy {
    /// Publish straight to the recipient's inbox topic.
    Publish,
    /// Ask the backend relay to deliver on our behalf.
    Relay,
}

impl std::str::FromStr for SendStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "publish" => Ok(SendStrategy::Publish),
            "relay" => Ok(SendStrategy::Relay),
            other => Err(format!("unknown send strategy: {other}")),
        }
    }
}

#[derive(Clone)]
pub struct OutboundDispatcher {
    session: Session,
    relay: Arc<dyn RelaySender>,
    log: MessageLog,
    events: broadcast::Sender<ClientEvent>,
    namespace: TopicNamespace,
    strategy: SendStrategy,
}

impl OutboundDispatcher {
    pub fn new(
        session: Session,
        relay: Arc<dyn RelaySender>,
        log: MessageLog,
        events: broadcast::Sender<ClientEvent>,
        namespace: TopicNamespace,
        strategy: SendStrategy,
    ) -> Self {
        Self {
            session,
            relay,
            log,
            events,
            namespace,
            strategy,
        }
    }

    pub fn strategy(&self) -> SendStrategy {
        self.strategy
    }

    /// Send a composed message to a recipient by name.
    ///
    /// Both fields are validated after trimming; an invalid send fails here
    /// without producing any broker or relay traffic.
    pub async fn send(&self, recipient: &str, body: &str) -> Result<(), SendError> {
        let recipient = recipient.trim();
        let body = body.trim();
        if recipient.is_empty() {
            return Err(ValidationError::EmptyRecipient.into());
        }
        if body.is_empty() {
            return Err(ValidationError::EmptyBody.into());
        }

        match self.strategy {
            SendStrategy::Publish => {
                let topic = Topic::new(self.namespace, recipient).map_err(SendError::Validation)?;
                self.session
                    .publish(&topic, body.as_bytes().to_vec())
                    .await?;
                debug!(topic = %topic, "Published message");

                // Optimistic echo: the broker will not deliver our own
                // publish back to us.
                self.log.prepend(Message {
                    id: Uuid::new_v4(),
                    from: LOCAL_ECHO_SENDER.to_string(),
                    body: body.to_string(),
                    timestamp: Utc::now(),
                    read: true,
                    origin: MessageOrigin::LocalEcho,
                });
            }
            SendStrategy::Relay => {
                // Topic shape is still validated locally before any traffic.
                Topic::new(self.namespace, recipient).map_err(SendError::Validation)?;
                self.relay.send_message(recipient, body).await?;
                debug!(recipient = %recipient, "Message relayed through backend");
            }
        }

        info!(recipient = %recipient, strategy = ?self.strategy, "Message sent");
        emit(
            &self.events,
            ClientEvent::MessageSent {
                to: recipient.to_string(),
            },
        );
        Ok(())
    }
}
