//! Production broker transport over libp2p GossipSub with QUIC.
//!
//! The broker is a well-known hub node; a connection is "up" while the QUIC
//! connection to that node is established. Each `connect()` builds a fresh
//! swarm, dials the broker, and spawns a dedicated event loop that translates
//! [`TransportCommand`]s into swarm calls and swarm events back into
//! [`TransportEvent`]s.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use libp2p::{
    gossipsub::{self, IdentTopic, MessageAuthenticity, ValidationMode},
    identify,
    identity::Keypair,
    multiaddr::Protocol,
    swarm::{NetworkBehaviour, SwarmEvent},
    Multiaddr, PeerId, Swarm, SwarmBuilder,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use pager_shared::constants::{
    COMMAND_BUFFER, CONNECT_TIMEOUT_MS, GOSSIPSUB_HEARTBEAT_SECS, MAX_PAYLOAD_SIZE,
    PROTOCOL_VERSION, TRANSPORT_EVENT_BUFFER,
};
use pager_shared::error::ConnectionError;

use crate::transport::{BrokerTransport, TransportCommand, TransportConn, TransportEvent};

/// Composed network behaviour for pager nodes.
#[derive(NetworkBehaviour)]
#[behaviour(to_swarm = "PagerEvent")]
pub struct PagerBehaviour {
    /// Pub/sub delivery of notification payloads
    pub gossipsub: gossipsub::Behaviour,
    /// Protocol identification between client and broker
    pub identify: identify::Behaviour,
}

/// Events emitted by the composed behaviour, one variant per sub-behaviour.
#[derive(Debug)]
pub enum PagerEvent {
    Gossipsub(gossipsub::Event),
    Identify(identify::Event),
}

impl From<gossipsub::Event> for PagerEvent {
    fn from(event: gossipsub::Event) -> Self {
        PagerEvent::Gossipsub(event)
    }
}

impl From<identify::Event> for PagerEvent {
    fn from(event: identify::Event) -> Self {
        PagerEvent::Identify(event)
    }
}

/// Build a swarm with the QUIC transport and the pager behaviour.
///
/// Shared by the client transport (which dials the broker) and the broker
/// binary (which listens).
pub fn build_swarm(keypair: Keypair) -> anyhow::Result<Swarm<PagerBehaviour>> {
    let swarm = SwarmBuilder::with_existing_identity(keypair)
        .with_tokio()
        .with_quic()
        .with_behaviour(|key| -> std::result::Result<PagerBehaviour, Box<dyn std::error::Error + Send + Sync>> {
            // Default message ids (source + sequence number) so identical
            // payloads from the same sender remain distinct deliveries.
            let gossipsub_config = gossipsub::ConfigBuilder::default()
                .heartbeat_interval(Duration::from_secs(GOSSIPSUB_HEARTBEAT_SECS))
                .validation_mode(ValidationMode::Strict)
                .max_transmit_size(MAX_PAYLOAD_SIZE)
                .build()
                .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> {
                    format!("GossipSub config: {e}").into()
                })?;

            let gossipsub = gossipsub::Behaviour::new(
                MessageAuthenticity::Signed(key.clone()),
                gossipsub_config,
            )
            .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> {
                format!("GossipSub init: {e}").into()
            })?;

            let identify_config = identify::Config::new(PROTOCOL_VERSION.to_string(), key.public());
            let identify = identify::Behaviour::new(identify_config);

            Ok(PagerBehaviour {
                gossipsub,
                identify,
            })
        })?
        .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(Duration::from_secs(60)))
        .build();

    Ok(swarm)
}

/// Configuration for the gossip transport.
#[derive(Clone)]
pub struct GossipConfig {
    /// Multiaddr of the broker node, optionally with a trailing `/p2p/` peer
    /// id. When present the peer id pins which established connection counts
    /// as "the broker".
    pub broker_addr: String,
    /// How long a single dial may take before the attempt fails.
    pub connect_timeout: Duration,
    /// Node identity presented to the broker.
    pub keypair: Keypair,
}

impl GossipConfig {
    /// Config with a fresh ephemeral identity and default timeout.
    pub fn new(broker_addr: impl Into<String>) -> Self {
        Self {
            broker_addr: broker_addr.into(),
            connect_timeout: Duration::from_millis(CONNECT_TIMEOUT_MS),
            keypair: Keypair::generate_ed25519(),
        }
    }
}

/// [`BrokerTransport`] implementation over libp2p GossipSub.
pub struct GossipTransport {
    config: GossipConfig,
}

impl GossipTransport {
    pub fn new(config: GossipConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrokerTransport for GossipTransport {
    async fn connect(&self) -> Result<TransportConn, ConnectionError> {
        let addr: Multiaddr =
            self.config
                .broker_addr
                .parse()
                .map_err(|e| ConnectionError::Unreachable {
                    addr: self.config.broker_addr.clone(),
                    reason: format!("invalid multiaddr: {e}"),
                })?;

        let mut swarm =
            build_swarm(self.config.keypair.clone()).map_err(|e| ConnectionError::Unreachable {
                addr: self.config.broker_addr.clone(),
                reason: format!("swarm construction failed: {e}"),
            })?;

        let expected_peer = extract_peer_id(&addr);
        swarm
            .dial(addr.clone())
            .map_err(|e| ConnectionError::Unreachable {
                addr: self.config.broker_addr.clone(),
                reason: e.to_string(),
            })?;

        let broker_peer = tokio::time::timeout(
            self.config.connect_timeout,
            wait_for_broker(&mut swarm, expected_peer, &self.config.broker_addr),
        )
        .await
        .map_err(|_| ConnectionError::Timeout(self.config.connect_timeout))??;

        info!(broker = %broker_peer, addr = %addr, "Connected to broker");

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, event_rx) = mpsc::channel(TRANSPORT_EVENT_BUFFER);
        tokio::spawn(run_connection(swarm, broker_peer, cmd_rx, event_tx));

        Ok(TransportConn {
            commands: cmd_tx,
            events: event_rx,
        })
    }
}

/// Drive the swarm until the dial to the broker resolves either way.
async fn wait_for_broker(
    swarm: &mut Swarm<PagerBehaviour>,
    expected_peer: Option<PeerId>,
    addr: &str,
) -> Result<PeerId, ConnectionError> {
    loop {
        match swarm.select_next_some().await {
            SwarmEvent::ConnectionEstablished { peer_id, .. }
                if expected_peer.map_or(true, |p| p == peer_id) =>
            {
                return Ok(peer_id);
            }
            SwarmEvent::OutgoingConnectionError { error, .. } => {
                return Err(ConnectionError::Unreachable {
                    addr: addr.to_string(),
                    reason: error.to_string(),
                });
            }
            other => {
                debug!(event = ?other, "Swarm event while dialing broker");
            }
        }
    }
}

/// Per-connection event loop: commands in, swarm events out. Ends when the
/// broker connection closes or the session drops the command channel.
async fn run_connection(
    mut swarm: Swarm<PagerBehaviour>,
    broker_peer: PeerId,
    mut cmd_rx: mpsc::Receiver<TransportCommand>,
    event_tx: mpsc::Sender<TransportEvent>,
) {
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(TransportCommand::Subscribe { topic, ack }) => {
                        let result = swarm
                            .behaviour_mut()
                            .gossipsub
                            .subscribe(&IdentTopic::new(topic.as_str()))
                            .map(|_| ())
                            .map_err(|e| e.to_string());
                        if let Err(ref reason) = result {
                            warn!(topic = %topic, reason = %reason, "Subscribe failed");
                        }
                        let _ = ack.send(result);
                    }
                    Some(TransportCommand::Unsubscribe { topic, ack }) => {
                        let _ = swarm
                            .behaviour_mut()
                            .gossipsub
                            .unsubscribe(&IdentTopic::new(topic.as_str()));
                        let _ = ack.send(Ok(()));
                    }
                    Some(TransportCommand::Publish { topic, payload, ack }) => {
                        let result = swarm
                            .behaviour_mut()
                            .gossipsub
                            .publish(IdentTopic::new(topic.as_str()), payload.to_vec())
                            .map(|_| ())
                            .map_err(|e| e.to_string());
                        if let Err(ref reason) = result {
                            warn!(topic = %topic, reason = %reason, "Publish failed");
                        }
                        let _ = ack.send(result);
                    }
                    None => {
                        debug!("Transport command channel closed, ending connection");
                        break;
                    }
                }
            }

            event = swarm.select_next_some() => {
                match event {
                    SwarmEvent::Behaviour(PagerEvent::Gossipsub(gossipsub::Event::Message {
                        message,
                        ..
                    })) => {
                        let topic = message.topic.into_string();
                        debug!(topic = %topic, len = message.data.len(), "Delivery from broker");
                        if event_tx
                            .send(TransportEvent::Message {
                                topic,
                                payload: Bytes::from(message.data),
                            })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }

                    SwarmEvent::Behaviour(PagerEvent::Identify(identify::Event::Received {
                        peer_id,
                        info,
                        ..
                    })) => {
                        debug!(
                            peer = %peer_id,
                            protocol = %info.protocol_version,
                            "Identify: received info from broker"
                        );
                    }

                    SwarmEvent::ConnectionClosed {
                        peer_id,
                        num_established,
                        cause,
                        ..
                    } if peer_id == broker_peer && num_established == 0 => {
                        let reason = cause
                            .map(|c| c.to_string())
                            .unwrap_or_else(|| "connection closed".to_string());
                        warn!(reason = %reason, "Broker connection closed");
                        let _ = event_tx.send(TransportEvent::Closed { reason }).await;
                        break;
                    }

                    SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                        warn!(peer = ?peer_id, error = %error, "Outgoing connection error");
                    }

                    _ => {}
                }
            }
        }
    }

    debug!("Gossip connection loop terminated");
}

/// Extract a `PeerId` from a multiaddr, if one is present.
fn extract_peer_id(addr: &Multiaddr) -> Option<PeerId> {
    addr.iter().find_map(|p| {
        if let Protocol::P2p(peer_id) = p {
            Some(peer_id)
        } else {
            None
        }
    })
}
