//! The broker hub: a gossipsub node all clients dial.
//!
//! Runs the swarm event loop in a background task. The HTTP relay endpoint
//! publishes through [`BrokerHandle`]; topic membership is mirrored from
//! client subscriptions (see [`crate::topics::TopicMirror`]) so the hub
//! forwards between clients that are only connected to it.

use futures::StreamExt;
use libp2p::{
    gossipsub::{self, IdentTopic},
    identify,
    identity::Keypair,
    swarm::SwarmEvent,
    Multiaddr, PeerId,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use pager_net::gossip::{build_swarm, PagerEvent};
use pager_shared::constants::COMMAND_BUFFER;

use crate::topics::TopicMirror;

/// Commands sent into the broker task.
#[derive(Debug)]
pub enum BrokerCommand {
    /// Publish a payload into a topic on behalf of the relay API.
    Publish {
        topic: String,
        payload: Vec<u8>,
        ack: oneshot::Sender<Result<(), String>>,
    },
}

/// Handle used by the HTTP API to publish into the mesh.
#[derive(Clone)]
pub struct BrokerHandle {
    cmd_tx: mpsc::Sender<BrokerCommand>,
}

impl BrokerHandle {
    pub async fn publish(&self, topic: String, payload: Vec<u8>) -> Result<(), String> {
        let (ack, rx) = oneshot::channel();
        self.cmd_tx
            .send(BrokerCommand::Publish { topic, payload, ack })
            .await
            .map_err(|_| "broker task is gone".to_string())?;
        rx.await.map_err(|_| "broker task is gone".to_string())?
    }
}

/// Spawn the broker node in a background tokio task.
///
/// Returns the publish handle and the node's peer id (clients may pin it in
/// their broker multiaddr).
pub async fn spawn_broker(listen_addr: &str) -> anyhow::Result<(BrokerHandle, PeerId)> {
    let keypair = Keypair::generate_ed25519();
    let mut swarm = build_swarm(keypair)?;
    let local_peer_id = *swarm.local_peer_id();

    let addr: Multiaddr = listen_addr.parse()?;
    swarm.listen_on(addr)?;
    info!(peer_id = %local_peer_id, addr = %listen_addr, "Broker node listening");

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<BrokerCommand>(COMMAND_BUFFER);

    tokio::spawn(async move {
        let mut mirror = TopicMirror::new();

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(BrokerCommand::Publish { topic, payload, ack }) => {
                            let result = swarm
                                .behaviour_mut()
                                .gossipsub
                                .publish(IdentTopic::new(topic.as_str()), payload)
                                .map(|_| ())
                                .map_err(|e| e.to_string());
                            if let Err(ref reason) = result {
                                warn!(topic = %topic, reason = %reason, "Relay publish failed");
                            }
                            let _ = ack.send(result);
                        }
                        None => {
                            info!("Broker command channel closed, shutting down node");
                            break;
                        }
                    }
                }

                event = swarm.select_next_some() => {
                    match event {
                        SwarmEvent::Behaviour(PagerEvent::Gossipsub(gossipsub::Event::Subscribed {
                            peer_id,
                            topic,
                        })) => {
                            if mirror.on_subscribed(peer_id, topic.as_str()) {
                                if let Err(e) = swarm
                                    .behaviour_mut()
                                    .gossipsub
                                    .subscribe(&IdentTopic::new(topic.as_str()))
                                {
                                    warn!(topic = %topic, error = %e, "Hub failed to join topic");
                                }
                            }
                        }

                        SwarmEvent::Behaviour(PagerEvent::Gossipsub(gossipsub::Event::Unsubscribed {
                            peer_id,
                            topic,
                        })) => {
                            if mirror.on_unsubscribed(&peer_id, topic.as_str()) {
                                let _ = swarm
                                    .behaviour_mut()
                                    .gossipsub
                                    .unsubscribe(&IdentTopic::new(topic.as_str()));
                            }
                        }

                        SwarmEvent::Behaviour(PagerEvent::Gossipsub(gossipsub::Event::Message {
                            message,
                            ..
                        })) => {
                            // Forwarding is gossipsub's job; the hub only observes.
                            debug!(
                                topic = %message.topic,
                                source = ?message.source,
                                len = message.data.len(),
                                "Forwarded delivery"
                            );
                        }

                        SwarmEvent::Behaviour(PagerEvent::Identify(identify::Event::Received {
                            peer_id,
                            info,
                            ..
                        })) => {
                            debug!(peer = %peer_id, protocol = %info.protocol_version, "Client identified");
                        }

                        SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                            info!(peer = %peer_id, "Client connected");
                        }

                        SwarmEvent::ConnectionClosed { peer_id, num_established, .. } => {
                            if num_established == 0 {
                                info!(peer = %peer_id, "Client disconnected");
                                for topic in mirror.on_peer_gone(&peer_id) {
                                    let _ = swarm
                                        .behaviour_mut()
                                        .gossipsub
                                        .unsubscribe(&IdentTopic::new(topic.as_str()));
                                }
                            }
                        }

                        SwarmEvent::NewListenAddr { address, .. } => {
                            info!(addr = %address, "Listening on new address");
                        }

                        SwarmEvent::IncomingConnectionError { error, .. } => {
                            warn!(error = %error, "Incoming connection error");
                        }

                        _ => {}
                    }
                }
            }
        }

        info!("Broker event loop terminated");
    });

    Ok((BrokerHandle { cmd_tx }, local_peer_id))
}
