//! End-to-end client behaviour against the mock broker: topic binding,
//! reconciliation ordering, send strategies, validation, and concurrency.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use pager_client::{Client, ClientConfig, RelaySender, SendStrategy, TopicBinder};
use pager_net::testing::{MockBroker, MockOp};
use pager_net::{ReconnectPolicy, Session, SessionConfig, SubscribePolicy};
use pager_shared::error::{RelayError, SendError};
use pager_shared::identity::Identity;
use pager_shared::types::{ConnectionState, MessageOrigin, TopicNamespace, UserId};

const WAIT: Duration = Duration::from_secs(5);

/// Relay double that records calls and optionally rejects them.
#[derive(Clone, Default)]
struct RecordingRelay {
    calls: Arc<Mutex<Vec<(String, String)>>>,
    reject: bool,
}

impl RecordingRelay {
    fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RelaySender for RecordingRelay {
    async fn send_message(&self, target: &str, message: &str) -> Result<(), RelayError> {
        if self.reject {
            return Err(RelayError::Rejected {
                status: 502,
                message: "broker publish failed".to_string(),
            });
        }
        self.calls
            .lock()
            .unwrap()
            .push((target.to_string(), message.to_string()));
        Ok(())
    }
}

fn identity(name: &str) -> Identity {
    Identity::new(name, UserId::new()).unwrap()
}

fn config(strategy: SendStrategy) -> ClientConfig {
    ClientConfig {
        send_strategy: strategy,
        ..ClientConfig::default()
    }
}

async fn login(
    strategy: SendStrategy,
    broker: &MockBroker,
    relay: &RecordingRelay,
    name: &str,
) -> Client {
    Client::login_with(
        config(strategy),
        identity(name),
        broker.clone(),
        Arc::new(relay.clone()),
    )
    .await
    .unwrap()
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_login_binds_inbox_topic() {
    let broker = MockBroker::new();
    let relay = RecordingRelay::default();
    let client = login(SendStrategy::Relay, &broker, &relay, "alice").await;

    assert_eq!(client.connection_state(), ConnectionState::Connected);
    assert_eq!(broker.subscriber_count("alerts/alice"), 1);
    assert_eq!(
        client.binder().bound().map(|t| t.to_string()),
        Some("alerts/alice".to_string())
    );
}

#[tokio::test]
async fn test_rebind_unsubscribes_old_topic_first() {
    let broker = MockBroker::new();
    let relay = RecordingRelay::default();
    let client = login(SendStrategy::Relay, &broker, &relay, "alice").await;

    client.binder().bind(&identity("bob")).await.unwrap();

    assert_eq!(broker.subscriber_count("alerts/alice"), 0);
    assert_eq!(broker.subscriber_count("alerts/bob"), 1);

    let ops: Vec<MockOp> = broker
        .ops()
        .into_iter()
        .filter(|op| !matches!(op, MockOp::Connect))
        .collect();
    assert_eq!(
        ops,
        vec![
            MockOp::Subscribe("alerts/alice".to_string()),
            MockOp::Unsubscribe("alerts/alice".to_string()),
            MockOp::Subscribe("alerts/bob".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_rebind_same_identity_is_idempotent() {
    let broker = MockBroker::new();
    let relay = RecordingRelay::default();
    let client = login(SendStrategy::Relay, &broker, &relay, "alice").await;

    client.binder().bind(&identity("alice")).await.unwrap();
    client.binder().bind(&identity("alice")).await.unwrap();

    let subscribes = broker
        .ops()
        .into_iter()
        .filter(|op| matches!(op, MockOp::Subscribe(_)))
        .count();
    assert_eq!(subscribes, 1);
}

#[tokio::test]
async fn test_unbind_is_noop_when_unbound() {
    let broker = MockBroker::new();
    let session = Session::spawn(SessionConfig::default(), broker.clone());
    let binder = TopicBinder::new(session.clone(), TopicNamespace::Alerts);

    // Nothing bound: must not error or touch the broker.
    binder.unbind().await;
    assert!(broker.ops().is_empty());
}

#[tokio::test]
async fn test_bind_before_connect_subscribes_on_connected() {
    let broker = MockBroker::new();
    let session = Session::spawn(
        SessionConfig {
            reconnect: ReconnectPolicy {
                initial: Duration::from_millis(10),
                max: Duration::from_millis(50),
                multiplier: 2.0,
                jitter: 0.0,
            },
            subscribe_policy: SubscribePolicy::Reject,
            event_buffer: 1024,
        },
        broker.clone(),
    );
    let binder = TopicBinder::new(session.clone(), TopicNamespace::Alerts);
    let _reassert = binder.spawn_reassert(session.cancellation_token());

    // The session would reject a subscribe right now; the binder records the
    // desired topic instead of failing.
    binder.bind(&identity("alice")).await.unwrap();
    assert_eq!(broker.subscriber_count("alerts/alice"), 0);

    session.connect().await.unwrap();
    wait_until(|| broker.subscriber_count("alerts/alice") == 1).await;
}

#[tokio::test]
async fn test_validation_failures_produce_no_traffic() {
    let broker = MockBroker::new();
    let relay = RecordingRelay::default();
    let client = login(SendStrategy::Relay, &broker, &relay, "alice").await;

    let err = client.send("", "hello").await.unwrap_err();
    assert!(matches!(err, SendError::Validation(_)));

    let err = client.send("bob", "   ").await.unwrap_err();
    assert!(matches!(err, SendError::Validation(_)));

    assert!(relay.calls().is_empty());
    assert!(broker.published().is_empty());
    assert!(client.messages().is_empty());
}

#[tokio::test]
async fn test_publish_strategy_synthesizes_local_echo() {
    let broker = MockBroker::new();
    let relay = RecordingRelay::default();
    let client = login(SendStrategy::Publish, &broker, &relay, "alice").await;

    client.send("bob", "hi").await.unwrap();

    let messages = client.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].from, "You");
    assert_eq!(messages[0].body, "hi");
    assert_eq!(messages[0].origin, MessageOrigin::LocalEcho);
    assert!(messages[0].read);

    // Straight to the broker, nothing through the relay.
    assert!(relay.calls().is_empty());
    let published = broker.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "alerts/bob");

    // Alice is not subscribed to bob's topic, so no Inbound copy appears.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.message_log().inbound_count(), 0);
}

#[tokio::test]
async fn test_publish_to_self_arrives_inbound_too() {
    let broker = MockBroker::new();
    let relay = RecordingRelay::default();
    let client = login(SendStrategy::Publish, &broker, &relay, "alice").await;

    client.send("alice", "note to self").await.unwrap();

    // Own topic is subscribed, so the echo is joined by a real delivery.
    wait_until(|| client.message_log().inbound_count() == 1).await;
    assert_eq!(client.messages().len(), 2);
}

#[tokio::test]
async fn test_relay_strategy_sends_without_echo() {
    let broker = MockBroker::new();
    let relay = RecordingRelay::default();
    let client = login(SendStrategy::Relay, &broker, &relay, "alice").await;

    client.send(" bob ", " hi there ").await.unwrap();

    assert_eq!(relay.calls(), vec![("bob".to_string(), "hi there".to_string())]);
    assert!(broker.published().is_empty());
    assert!(client.messages().is_empty());
}

#[tokio::test]
async fn test_relay_rejection_is_surfaced() {
    let broker = MockBroker::new();
    let relay = RecordingRelay::rejecting();
    let client = login(SendStrategy::Relay, &broker, &relay, "alice").await;

    let err = client.send("bob", "hi").await.unwrap_err();
    assert!(matches!(
        err,
        SendError::Relay(RelayError::Rejected { status: 502, .. })
    ));
    assert!(client.messages().is_empty());
}

#[tokio::test]
async fn test_inbound_messages_are_newest_first() {
    let broker = MockBroker::new();
    let relay = RecordingRelay::default();
    let client = login(SendStrategy::Relay, &broker, &relay, "alice").await;

    for i in 0..5 {
        broker.deliver("alerts/alice", format!("m{i}")).await;
    }
    wait_until(|| client.messages().len() == 5).await;

    let bodies: Vec<String> = client.messages().into_iter().map(|m| m.body).collect();
    assert_eq!(bodies, vec!["m4", "m3", "m2", "m1", "m0"]);
    assert!(client
        .messages()
        .iter()
        .all(|m| m.origin == MessageOrigin::Inbound));
}

#[tokio::test]
async fn test_sender_is_parsed_from_topic() {
    let broker = MockBroker::new();
    let relay = RecordingRelay::default();
    let client = login(SendStrategy::Relay, &broker, &relay, "alice").await;

    // The visible sender is the topic's identity segment.
    broker.deliver("alerts/alice", "welcome").await;
    wait_until(|| client.messages().len() == 1).await;
    assert_eq!(client.messages()[0].from, "alice");
}

#[tokio::test]
async fn test_undecodable_payload_becomes_degraded_message() {
    let broker = MockBroker::new();
    let relay = RecordingRelay::default();
    let client = login(SendStrategy::Relay, &broker, &relay, "alice").await;

    broker
        .deliver("alerts/alice", vec![0xffu8, 0xfe, 0x00])
        .await;

    wait_until(|| client.messages().len() == 1).await;
    let message = &client.messages()[0];
    assert!(message.body.contains("unreadable payload"));
    assert_eq!(message.origin, MessageOrigin::Inbound);
}

#[tokio::test]
async fn test_mark_read() {
    let broker = MockBroker::new();
    let relay = RecordingRelay::default();
    let client = login(SendStrategy::Relay, &broker, &relay, "alice").await;

    broker.deliver("alerts/alice", "unread").await;
    wait_until(|| client.messages().len() == 1).await;

    let id = client.messages()[0].id;
    assert_eq!(client.message_log().unread_count(), 1);
    assert!(client.mark_read(id));
    assert_eq!(client.message_log().unread_count(), 0);
}

#[tokio::test]
async fn test_concurrent_inbound_and_sends() {
    let broker = MockBroker::new();
    let relay = RecordingRelay::default();
    let client = login(SendStrategy::Publish, &broker, &relay, "alice").await;

    let inbound_broker = broker.clone();
    let inbound = tokio::spawn(async move {
        for i in 0..1000 {
            inbound_broker
                .deliver("alerts/alice", format!("in-{i}"))
                .await;
        }
    });

    let log = client.message_log();
    let sender_client = &client;
    let outbound = async {
        for i in 0..1000 {
            sender_client.send("bob", &format!("out-{i}")).await.unwrap();
        }
    };

    let (inbound_result, ()) = tokio::join!(inbound, outbound);
    inbound_result.unwrap();

    wait_until(|| log.inbound_count() == 1000).await;
    assert_eq!(log.len(), 2000);
    assert_eq!(broker.published().len(), 1000);
}

#[tokio::test]
async fn test_logout_tears_down_event_stream() {
    let broker = MockBroker::new();
    let relay = RecordingRelay::default();
    let client = login(SendStrategy::Relay, &broker, &relay, "alice").await;

    let mut events = client.events();
    client.logout().await;

    // All event senders die with the client; the stream ends rather than
    // hanging a UI listener forever.
    let ended = timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                Err(_) => continue,
            }
        }
    })
    .await;
    assert!(ended.is_ok());
}
