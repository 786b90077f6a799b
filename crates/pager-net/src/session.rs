//! The broker session: one long-lived connection, driven by a single event
//! loop task with tokio mpsc command and broadcast notification channels.
//!
//! The loop serializes every state transition (connection state, active
//! subscription set), so a subscribe racing a disconnect can never register
//! a phantom subscription against a dead connection. Reconnection runs as a
//! timer inside the same loop and is cancelled, together with all event
//! emission, the moment the session is shut down.

use std::collections::HashSet;

use bytes::Bytes;
use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pager_shared::constants::{COMMAND_BUFFER, SESSION_EVENT_BUFFER};
use pager_shared::error::{
    ConnectionError, PublishError, SubscriptionError, SubscriptionErrorKind,
};
use pager_shared::types::{ConnectionState, NotificationEvent, Topic};

use crate::backoff::ReconnectPolicy;
use crate::transport::{BrokerTransport, TransportCommand, TransportConn, TransportEvent};

// ---------------------------------------------------------------------------
// Public surface
// ---------------------------------------------------------------------------

/// Lifecycle events fanned out to all registered listeners.
///
/// Each listener gets an independent broadcast queue: a slow listener lags
/// and drops its own backlog, it never stalls delivery to the others or to
/// the transport's read path.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session reached Connected with every active subscription
    /// re-established. Listeners never observe Connected with a missing
    /// subscription.
    Connected,
    Disconnected { reason: String },
    Error { message: String },
    MessageReceived(NotificationEvent),
}

/// What `subscribe` does while the session is disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribePolicy {
    /// Record the topic and establish it on the next (re)connect; the call
    /// reports success.
    Queue,
    /// Refuse the call with a `SubscriptionError` naming the topic.
    Reject,
}

impl std::str::FromStr for SubscribePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queue" => Ok(SubscribePolicy::Queue),
            "reject" => Ok(SubscribePolicy::Reject),
            other => Err(format!("unknown subscribe policy: {other}")),
        }
    }
}

/// Session tuning knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub reconnect: ReconnectPolicy,
    pub subscribe_policy: SubscribePolicy,
    /// Capacity of each listener's broadcast queue.
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            subscribe_policy: SubscribePolicy::Queue,
            event_buffer: SESSION_EVENT_BUFFER,
        }
    }
}

/// Handle to a running broker session.
///
/// Cheap to clone; all clones drive the same session task. Exactly one
/// session exists per running client instance — it is created at login and
/// shut down at logout.
#[derive(Clone)]
pub struct Session {
    cmd_tx: mpsc::Sender<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
    state_rx: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
}

impl Session {
    /// Start the session event loop. No connection is attempted until
    /// [`Session::connect`] is called.
    pub fn spawn<T: BrokerTransport>(config: SessionConfig, transport: T) -> Session {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let (events, _) = broadcast::channel(config.event_buffer);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let cancel = CancellationToken::new();

        let task = SessionTask {
            transport,
            policy: config.reconnect,
            subscribe_policy: config.subscribe_policy,
            cmd_rx,
            events: events.clone(),
            state_tx,
            cancel: cancel.clone(),
            desired: HashSet::new(),
            conn: None,
            reconnect_at: None,
        };
        tokio::spawn(task.run());

        Session {
            cmd_tx,
            events,
            state_rx,
            cancel,
        }
    }

    /// Establish the broker connection.
    ///
    /// Idempotent: when the session is already Connected this returns
    /// immediately without touching the transport. A failed attempt is
    /// returned to the caller, who owns the retry decision for explicit
    /// connects; drops after a successful connect are retried autonomously.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        let (ack, rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCommand::Connect { ack })
            .await
            .map_err(|_| ConnectionError::ShutDown)?;
        rx.await.map_err(|_| ConnectionError::ShutDown)?
    }

    /// Subscribe to a topic.
    ///
    /// While disconnected the configured [`SubscribePolicy`] decides between
    /// queueing and rejecting; the request is never silently dropped.
    pub async fn subscribe(&self, topic: &Topic) -> Result<(), SubscriptionError> {
        let raw = topic.to_string();
        let (ack, rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCommand::Subscribe {
                topic: raw.clone(),
                ack,
            })
            .await
            .map_err(|_| closed_subscription(&raw))?;
        rx.await.map_err(|_| closed_subscription(&raw))?
    }

    /// Drop a topic subscription. A no-op if the topic was not subscribed.
    pub async fn unsubscribe(&self, topic: &Topic) -> Result<(), SubscriptionError> {
        let raw = topic.to_string();
        let (ack, rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCommand::Unsubscribe {
                topic: raw.clone(),
                ack,
            })
            .await
            .map_err(|_| closed_subscription(&raw))?;
        rx.await.map_err(|_| closed_subscription(&raw))?
    }

    /// Fire-and-forget publish. Success means the payload reached the
    /// transport's send queue, nothing more.
    pub async fn publish(
        &self,
        topic: &Topic,
        payload: impl Into<Bytes>,
    ) -> Result<(), PublishError> {
        let (ack, rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCommand::Publish {
                topic: topic.to_string(),
                payload: payload.into(),
                ack,
            })
            .await
            .map_err(|_| PublishError::SessionClosed)?;
        rx.await.map_err(|_| PublishError::SessionClosed)?
    }

    /// Register a new lifecycle-event listener.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Token cancelled when the session shuts down; child tasks tie their
    /// own loops to it.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Tear the session down: no reconnect attempts and no event emissions
    /// happen after this returns.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

fn closed_subscription(topic: &str) -> SubscriptionError {
    SubscriptionError {
        topic: topic.to_string(),
        kind: SubscriptionErrorKind::SessionClosed,
    }
}

// ---------------------------------------------------------------------------
// Session task
// ---------------------------------------------------------------------------

enum SessionCommand {
    Connect {
        ack: oneshot::Sender<Result<(), ConnectionError>>,
    },
    Subscribe {
        topic: String,
        ack: oneshot::Sender<Result<(), SubscriptionError>>,
    },
    Unsubscribe {
        topic: String,
        ack: oneshot::Sender<Result<(), SubscriptionError>>,
    },
    Publish {
        topic: String,
        payload: Bytes,
        ack: oneshot::Sender<Result<(), PublishError>>,
    },
}

enum LoopAction {
    Cancelled,
    Command(Option<SessionCommand>),
    Transport(Option<TransportEvent>),
    ReconnectDue,
}

struct SessionTask<T: BrokerTransport> {
    transport: T,
    policy: ReconnectPolicy,
    subscribe_policy: SubscribePolicy,
    cmd_rx: mpsc::Receiver<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    /// Topics that should be subscribed whenever the session is connected.
    desired: HashSet<String>,
    conn: Option<TransportConn>,
    /// Deadline and attempt counter of the pending reconnect, if any.
    reconnect_at: Option<(tokio::time::Instant, u32)>,
}

impl<T: BrokerTransport> SessionTask<T> {
    async fn run(mut self) {
        loop {
            let deadline = self.reconnect_at.map(|(at, _)| at);
            let action = tokio::select! {
                _ = self.cancel.cancelled() => LoopAction::Cancelled,
                cmd = self.cmd_rx.recv() => LoopAction::Command(cmd),
                ev = next_transport_event(&mut self.conn) => LoopAction::Transport(ev),
                _ = sleep_until_opt(deadline) => LoopAction::ReconnectDue,
            };

            match action {
                LoopAction::Cancelled => break,
                LoopAction::Command(None) => break,
                LoopAction::Command(Some(cmd)) => self.handle_command(cmd).await,
                LoopAction::Transport(ev) => self.handle_transport_event(ev),
                LoopAction::ReconnectDue => self.attempt_reconnect().await,
            }
        }

        self.state_tx.send_replace(ConnectionState::Disconnected);
        debug!("Session event loop terminated");
    }

    fn is_connected(&self) -> bool {
        *self.state_tx.borrow() == ConnectionState::Connected
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    fn emit(&self, event: SessionEvent) {
        if self.cancel.is_cancelled() {
            return;
        }
        // Err means no listeners are currently registered.
        let _ = self.events.send(event);
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Connect { ack } => {
                if self.is_connected() {
                    let _ = ack.send(Ok(()));
                    return;
                }
                let result = self.establish().await;
                let _ = ack.send(result);
            }

            SessionCommand::Subscribe { topic, ack } => {
                if self.is_connected() {
                    if self.desired.contains(&topic) {
                        // Idempotent: no redundant subscribe traffic.
                        let _ = ack.send(Ok(()));
                        return;
                    }
                    self.desired.insert(topic.clone());
                    match &self.conn {
                        Some(conn) => forward_subscribe(conn.commands.clone(), topic, ack),
                        None => {
                            let _ = ack.send(Err(SubscriptionError {
                                topic,
                                kind: SubscriptionErrorKind::Disconnected,
                            }));
                        }
                    }
                } else {
                    match self.subscribe_policy {
                        SubscribePolicy::Queue => {
                            debug!(topic = %topic, "Queueing subscription until connected");
                            self.desired.insert(topic);
                            let _ = ack.send(Ok(()));
                        }
                        SubscribePolicy::Reject => {
                            let _ = ack.send(Err(SubscriptionError {
                                topic,
                                kind: SubscriptionErrorKind::Disconnected,
                            }));
                        }
                    }
                }
            }

            SessionCommand::Unsubscribe { topic, ack } => {
                let was_desired = self.desired.remove(&topic);
                match (&self.conn, was_desired) {
                    (Some(conn), true) if self.is_connected() => {
                        forward_unsubscribe(conn.commands.clone(), topic, ack)
                    }
                    // Not subscribed, or nothing live to unsubscribe from.
                    _ => {
                        let _ = ack.send(Ok(()));
                    }
                }
            }

            SessionCommand::Publish {
                topic,
                payload,
                ack,
            } => {
                if !self.is_connected() {
                    let _ = ack.send(Err(PublishError::Disconnected { topic }));
                    return;
                }
                match &self.conn {
                    Some(conn) => forward_publish(conn.commands.clone(), topic, payload, ack),
                    None => {
                        let _ = ack.send(Err(PublishError::Disconnected { topic }));
                    }
                }
            }
        }
    }

    fn handle_transport_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Message { topic, payload }) => {
                self.emit(SessionEvent::MessageReceived(NotificationEvent {
                    topic,
                    payload,
                    received_at: Utc::now(),
                }));
            }
            Some(TransportEvent::Closed { reason }) => self.on_connection_lost(reason),
            None => {
                if self.conn.is_some() {
                    self.on_connection_lost("transport event channel closed".to_string());
                }
            }
        }
    }

    fn on_connection_lost(&mut self, reason: String) {
        warn!(reason = %reason, "Broker connection lost");
        self.conn = None;
        self.set_state(ConnectionState::Disconnected);
        self.emit(SessionEvent::Disconnected {
            reason: reason.clone(),
        });
        let delay = self.policy.delay(0);
        self.reconnect_at = Some((tokio::time::Instant::now() + delay, 0));
        debug!(delay_ms = delay.as_millis() as u64, "Scheduled reconnect");
    }

    /// One connect attempt: dial, then re-establish every desired topic
    /// *before* announcing Connected, so no listener ever observes a
    /// Connected session with a missing subscription.
    async fn establish(&mut self) -> Result<(), ConnectionError> {
        self.set_state(ConnectionState::Connecting);

        let mut conn = match self.transport.connect().await {
            Ok(conn) => conn,
            Err(e) => {
                self.set_state(ConnectionState::Errored);
                return Err(e);
            }
        };

        for topic in &self.desired {
            if let Err(reason) = transport_subscribe(&mut conn, topic).await {
                warn!(topic = %topic, reason = %reason, "Re-subscription failed");
                self.emit(SessionEvent::Error {
                    message: format!("re-subscription to {topic} failed: {reason}"),
                });
            }
        }

        self.conn = Some(conn);
        self.reconnect_at = None;
        self.set_state(ConnectionState::Connected);
        info!(subscriptions = self.desired.len(), "Broker session connected");
        self.emit(SessionEvent::Connected);
        Ok(())
    }

    async fn attempt_reconnect(&mut self) {
        let attempt = match self.reconnect_at.take() {
            Some((_, attempt)) => attempt,
            None => return,
        };
        if self.cancel.is_cancelled() {
            return;
        }

        info!(attempt, "Attempting broker reconnect");
        match self.establish().await {
            Ok(()) => {}
            Err(e) => {
                self.emit(SessionEvent::Error {
                    message: format!("reconnect attempt {attempt} failed: {e}"),
                });
                let next = attempt.saturating_add(1);
                let delay = self.policy.delay(next);
                self.reconnect_at = Some((tokio::time::Instant::now() + delay, next));
                debug!(
                    attempt = next,
                    delay_ms = delay.as_millis() as u64,
                    "Reconnect failed, backing off"
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn next_transport_event(conn: &mut Option<TransportConn>) -> Option<TransportEvent> {
    match conn.as_mut() {
        Some(c) => c.events.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Subscribe on a fresh connection and wait for the transport's ack.
/// Only used during (re)connect, before the connection is handed to the
/// main loop.
async fn transport_subscribe(conn: &mut TransportConn, topic: &str) -> Result<(), String> {
    let (ack, rx) = oneshot::channel();
    conn.commands
        .send(TransportCommand::Subscribe {
            topic: topic.to_string(),
            ack,
        })
        .await
        .map_err(|_| "transport command channel closed".to_string())?;
    rx.await
        .map_err(|_| "transport dropped subscribe ack".to_string())?
}

// The steady-state forwarders relay a command to the transport and map its
// ack back to the caller from a detached task, so the session loop never
// blocks on the transport and keeps draining inbound events.

fn forward_subscribe(
    commands: mpsc::Sender<TransportCommand>,
    topic: String,
    caller: oneshot::Sender<Result<(), SubscriptionError>>,
) {
    tokio::spawn(async move {
        let (ack, rx) = oneshot::channel();
        let cmd = TransportCommand::Subscribe {
            topic: topic.clone(),
            ack,
        };
        if commands.send(cmd).await.is_err() {
            let _ = caller.send(Err(SubscriptionError {
                topic,
                kind: SubscriptionErrorKind::Transport("transport closed".to_string()),
            }));
            return;
        }
        let result = match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(SubscriptionError {
                topic,
                kind: SubscriptionErrorKind::Transport(reason),
            }),
            Err(_) => Err(SubscriptionError {
                topic,
                kind: SubscriptionErrorKind::Transport("transport dropped ack".to_string()),
            }),
        };
        let _ = caller.send(result);
    });
}

fn forward_unsubscribe(
    commands: mpsc::Sender<TransportCommand>,
    topic: String,
    caller: oneshot::Sender<Result<(), SubscriptionError>>,
) {
    tokio::spawn(async move {
        let (ack, rx) = oneshot::channel();
        let cmd = TransportCommand::Unsubscribe {
            topic: topic.clone(),
            ack,
        };
        if commands.send(cmd).await.is_err() {
            // The connection died under us; the desired set was already
            // updated, so there is nothing left to undo.
            let _ = caller.send(Ok(()));
            return;
        }
        let result = match rx.await {
            Ok(Ok(())) | Err(_) => Ok(()),
            Ok(Err(reason)) => Err(SubscriptionError {
                topic,
                kind: SubscriptionErrorKind::Transport(reason),
            }),
        };
        let _ = caller.send(result);
    });
}

fn forward_publish(
    commands: mpsc::Sender<TransportCommand>,
    topic: String,
    payload: Bytes,
    caller: oneshot::Sender<Result<(), PublishError>>,
) {
    tokio::spawn(async move {
        let (ack, rx) = oneshot::channel();
        let cmd = TransportCommand::Publish {
            topic: topic.clone(),
            payload,
            ack,
        };
        if commands.send(cmd).await.is_err() {
            let _ = caller.send(Err(PublishError::Transport {
                topic,
                reason: "transport closed".to_string(),
            }));
            return;
        }
        let result = match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(PublishError::Transport { topic, reason }),
            Err(_) => Err(PublishError::Transport {
                topic,
                reason: "transport dropped ack".to_string(),
            }),
        };
        let _ = caller.send(result);
    });
}
