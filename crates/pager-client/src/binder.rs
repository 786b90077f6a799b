//! Keeps the session's inbound subscription aligned with the logged-in
//! identity.
//!
//! The binder is declarative: it records the desired inbox topic and
//! re-asserts it on every `Connected` event, so binding before the session
//! is connected (or across a drop) takes effect as soon as a connection is
//! available. The session's own resubscribe-on-reconnect covers topics that
//! were already active; the re-assert here covers binds issued while
//! disconnected under a rejecting subscribe policy.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use pager_net::{Session, SessionEvent};
use pager_shared::error::{SubscriptionError, SubscriptionErrorKind};
use pager_shared::identity::Identity;
use pager_shared::types::{Topic, TopicNamespace};

#[derive(Clone)]
pub struct TopicBinder {
    session: Session,
    namespace: TopicNamespace,
    desired: Arc<Mutex<Option<Topic>>>,
}

impl TopicBinder {
    pub fn new(session: Session, namespace: TopicNamespace) -> Self {
        Self {
            session,
            namespace,
            desired: Arc::new(Mutex::new(None)),
        }
    }

    /// The currently bound topic, if any.
    pub fn bound(&self) -> Option<Topic> {
        self.lock().clone()
    }

    /// Bind the identity's inbox topic, replacing any previous binding.
    ///
    /// Idempotent for the same identity. A different previous topic is
    /// unsubscribed before the new one is subscribed, so there is never
    /// more than one active inbound topic.
    pub async fn bind(&self, identity: &Identity) -> Result<(), SubscriptionError> {
        let topic = identity.inbox_topic(self.namespace);

        let previous = {
            let mut desired = self.lock();
            if desired.as_ref() == Some(&topic) {
                debug!(topic = %topic, "Identity already bound");
                return Ok(());
            }
            desired.replace(topic.clone())
        };

        if let Some(old) = previous {
            if let Err(e) = self.session.unsubscribe(&old).await {
                warn!(topic = %old, error = %e, "Failed to unsubscribe previous topic");
            }
        }

        match self.session.subscribe(&topic).await {
            Ok(()) => Ok(()),
            // Not connected yet: the desired topic is recorded and will be
            // subscribed when Connected fires.
            Err(SubscriptionError {
                kind: SubscriptionErrorKind::Disconnected,
                ..
            }) => {
                debug!(topic = %topic, "Binding recorded, waiting for connection");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Drop the active binding. Safe to call when nothing is bound.
    pub async fn unbind(&self) {
        let previous = self.lock().take();
        if let Some(topic) = previous {
            if let Err(e) = self.session.unsubscribe(&topic).await {
                warn!(topic = %topic, error = %e, "Failed to unsubscribe on unbind");
            }
        }
    }

    /// Re-assert the desired topic every time the session reports Connected.
    ///
    /// [`crate::Client`] wires this up at login; standalone users of the
    /// binder must spawn it themselves for pre-connect binds to take effect.
    pub fn spawn_reassert(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let binder = self.clone();
        let mut events = binder.session.events();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => event,
                };
                match event {
                    Ok(SessionEvent::Connected) => binder.reassert().await,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        // Connected may have been among the shed events.
                        binder.reassert().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Topic binder listener terminated");
        })
    }

    async fn reassert(&self) {
        let desired = self.lock().clone();
        if let Some(topic) = desired {
            // Idempotent at the session: an already-active topic produces
            // no extra subscribe traffic.
            if let Err(e) = self.session.subscribe(&topic).await {
                warn!(topic = %topic, error = %e, "Failed to re-assert binding");
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Topic>> {
        match self.desired.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
