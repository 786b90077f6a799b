//! The notification client: one session, one identity, one message log.
//!
//! Constructed at login and torn down at logout. Owns the broker session
//! explicitly — nothing here is ambient or global — and hands shared
//! handles to the binder, reconciler and dispatcher.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::info;
use uuid::Uuid;

use pager_net::{
    BrokerTransport, GossipConfig, GossipTransport, Session, SessionConfig,
};
use pager_shared::constants::SESSION_EVENT_BUFFER;
use pager_shared::error::{PagerError, SendError};
use pager_shared::identity::Identity;
use pager_shared::types::{ConnectionState, Message};

use crate::binder::TopicBinder;
use crate::config::ClientConfig;
use crate::dispatcher::OutboundDispatcher;
use crate::events::ClientEvent;
use crate::log::MessageLog;
use crate::reconciler;
use crate::relay::{RelayClient, RelaySender};

pub struct Client {
    identity: Identity,
    session: Session,
    log: MessageLog,
    binder: TopicBinder,
    dispatcher: OutboundDispatcher,
    events: broadcast::Sender<ClientEvent>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl Client {
    /// Log in against the configured broker and backend.
    ///
    /// Connects, binds the identity's inbox topic, and starts the
    /// reconciliation pipeline. A connect failure is returned to the caller;
    /// once connected, drops are handled by the session's own backoff loop.
    pub async fn login(config: ClientConfig, identity: Identity) -> Result<Client, PagerError> {
        let mut gossip = GossipConfig::new(config.broker_addr.clone());
        gossip.connect_timeout = config.connect_timeout;
        let transport = GossipTransport::new(gossip);
        let relay: Arc<dyn RelaySender> = Arc::new(RelayClient::new(
            config.relay_url.clone(),
            config.http_timeout,
        )?);
        Self::login_with(config, identity, transport, relay).await
    }

    /// Log in with explicit transport and relay implementations.
    ///
    /// This is the full constructor; [`Client::login`] wires the production
    /// gossip transport and HTTP relay into it.
    pub async fn login_with<T: BrokerTransport>(
        config: ClientConfig,
        identity: Identity,
        transport: T,
        relay: Arc<dyn RelaySender>,
    ) -> Result<Client, PagerError> {
        let session = Session::spawn(
            SessionConfig {
                subscribe_policy: config.subscribe_policy,
                ..SessionConfig::default()
            },
            transport,
        );
        let cancel = session.cancellation_token();
        let (events, _) = broadcast::channel(SESSION_EVENT_BUFFER);
        let log = MessageLog::new();

        // The reconciler listens before the first connect so no lifecycle
        // event is missed.
        let reconciler_task = reconciler::spawn(
            session.events(),
            log.clone(),
            events.clone(),
            cancel.clone(),
        );

        let binder = TopicBinder::new(session.clone(), config.namespace);
        let binder_task = binder.spawn_reassert(cancel.clone());

        let dispatcher = OutboundDispatcher::new(
            session.clone(),
            relay,
            log.clone(),
            events.clone(),
            config.namespace,
            config.send_strategy,
        );

        session.connect().await?;
        binder.bind(&identity).await?;

        info!(
            user = %identity.name(),
            strategy = ?config.send_strategy,
            namespace = %config.namespace,
            "Client logged in"
        );

        Ok(Client {
            identity,
            session,
            log,
            binder,
            dispatcher,
            events,
            tasks: vec![reconciler_task, binder_task],
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Send a message to a recipient by name, using the configured strategy.
    pub async fn send(&self, recipient: &str, body: &str) -> Result<(), SendError> {
        self.dispatcher.send(recipient, body).await
    }

    /// Snapshot of the message log, newest first.
    pub fn messages(&self) -> Vec<Message> {
        self.log.snapshot()
    }

    pub fn message_log(&self) -> MessageLog {
        self.log.clone()
    }

    pub fn mark_read(&self, id: Uuid) -> bool {
        self.log.mark_read(id)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn watch_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.session.watch_state()
    }

    /// Register a listener for transient UI notifications.
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Direct access to the session, for callers that need raw lifecycle
    /// events or ad-hoc subscriptions.
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn binder(&self) -> &TopicBinder {
        &self.binder
    }

    /// Tear the session down. After this returns no reconnect attempts run
    /// and no further events are emitted; the message log is discarded with
    /// the client.
    pub async fn logout(self) {
        self.binder.unbind().await;
        self.session.shutdown();
        for task in self.tasks {
            let _ = task.await;
        }
        info!(user = %self.identity.name(), "Client logged out");
    }
}
