//! In-process mock broker for session and client tests.
//!
//! Behaves like a topic registry with scriptable failures: tests can make
//! the next N connect attempts fail, deliver payloads into subscribed
//! topics, and sever every live connection to exercise the reconnect path.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use pager_shared::constants::{COMMAND_BUFFER, TRANSPORT_EVENT_BUFFER};
use pager_shared::error::ConnectionError;

use crate::transport::{BrokerTransport, TransportCommand, TransportConn, TransportEvent};

/// Broker-side operations in the order the mock observed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOp {
    Connect,
    Subscribe(String),
    Unsubscribe(String),
    Publish(String),
}

#[derive(Default)]
struct MockState {
    next_conn: u64,
    conns: HashMap<u64, mpsc::Sender<TransportEvent>>,
    topics: HashMap<String, HashSet<u64>>,
    fail_connects: u32,
    connect_count: u64,
    ops: Vec<MockOp>,
    published: Vec<(String, Bytes)>,
}

#[derive(Clone, Default)]
pub struct MockBroker {
    state: Arc<Mutex<MockState>>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` connect attempts fail with an unreachable error.
    pub fn fail_next_connects(&self, n: u32) {
        self.lock().fail_connects = n;
    }

    /// Number of connect attempts observed (successful or not).
    pub fn connect_count(&self) -> u64 {
        self.lock().connect_count
    }

    /// Number of live connections subscribed to the topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.lock().topics.get(topic).map_or(0, HashSet::len)
    }

    /// Broker-side operation log, in observation order.
    pub fn ops(&self) -> Vec<MockOp> {
        self.lock().ops.clone()
    }

    /// Everything published through the broker, in publish order.
    pub fn published(&self) -> Vec<(String, Bytes)> {
        self.lock().published.clone()
    }

    /// Inject a delivery from the broker side. Returns how many connections
    /// received it.
    pub async fn deliver(&self, topic: &str, payload: impl Into<Bytes>) -> usize {
        let targets: Vec<mpsc::Sender<TransportEvent>> = {
            let state = self.lock();
            state
                .topics
                .get(topic)
                .into_iter()
                .flatten()
                .filter_map(|id| state.conns.get(id).cloned())
                .collect()
        };

        let payload = payload.into();
        let mut delivered = 0;
        for tx in targets {
            let event = TransportEvent::Message {
                topic: topic.to_string(),
                payload: payload.clone(),
            };
            if tx.send(event).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Sever every live connection, as if the broker crashed.
    pub async fn drop_all_connections(&self, reason: &str) {
        let targets: Vec<mpsc::Sender<TransportEvent>> = {
            let mut state = self.lock();
            state.topics.clear();
            state.conns.drain().map(|(_, tx)| tx).collect()
        };
        for tx in targets {
            let _ = tx
                .send(TransportEvent::Closed {
                    reason: reason.to_string(),
                })
                .await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock broker state poisoned")
    }
}

#[async_trait]
impl BrokerTransport for MockBroker {
    async fn connect(&self) -> Result<TransportConn, ConnectionError> {
        let (conn_id, event_rx) = {
            let mut state = self.lock();
            state.connect_count += 1;
            state.ops.push(MockOp::Connect);
            if state.fail_connects > 0 {
                state.fail_connects -= 1;
                return Err(ConnectionError::Unreachable {
                    addr: "mock://broker".to_string(),
                    reason: "scripted connect failure".to_string(),
                });
            }
            let id = state.next_conn;
            state.next_conn += 1;
            let (event_tx, event_rx) = mpsc::channel(TRANSPORT_EVENT_BUFFER);
            state.conns.insert(id, event_tx);
            (id, event_rx)
        };

        let (cmd_tx, mut cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let shared = self.state.clone();
        tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                match cmd {
                    TransportCommand::Subscribe { topic, ack } => {
                        let mut state = shared.lock().expect("mock broker state poisoned");
                        if !state.conns.contains_key(&conn_id) {
                            let _ = ack.send(Err("connection closed".to_string()));
                            continue;
                        }
                        state.topics.entry(topic.clone()).or_default().insert(conn_id);
                        state.ops.push(MockOp::Subscribe(topic));
                        let _ = ack.send(Ok(()));
                    }

                    TransportCommand::Unsubscribe { topic, ack } => {
                        let mut state = shared.lock().expect("mock broker state poisoned");
                        if let Some(subs) = state.topics.get_mut(&topic) {
                            subs.remove(&conn_id);
                            if subs.is_empty() {
                                state.topics.remove(&topic);
                            }
                        }
                        state.ops.push(MockOp::Unsubscribe(topic));
                        let _ = ack.send(Ok(()));
                    }

                    TransportCommand::Publish { topic, payload, ack } => {
                        let targets: Vec<mpsc::Sender<TransportEvent>> = {
                            let mut state = shared.lock().expect("mock broker state poisoned");
                            state.ops.push(MockOp::Publish(topic.clone()));
                            state.published.push((topic.clone(), payload.clone()));
                            state
                                .topics
                                .get(&topic)
                                .into_iter()
                                .flatten()
                                .filter_map(|id| state.conns.get(id).cloned())
                                .collect()
                        };
                        for tx in targets {
                            let event = TransportEvent::Message {
                                topic: topic.clone(),
                                payload: payload.clone(),
                            };
                            let _ = tx.send(event).await;
                        }
                        let _ = ack.send(Ok(()));
                    }
                }
            }

            // Session dropped this connection; forget it broker-side.
            let mut state = shared.lock().expect("mock broker state poisoned");
            state.conns.remove(&conn_id);
            for subs in state.topics.values_mut() {
                subs.remove(&conn_id);
            }
            state.topics.retain(|_, subs| !subs.is_empty());
        });

        Ok(TransportConn {
            commands: cmd_tx,
            events: event_rx,
        })
    }
}
