//! Session behaviour against the in-process mock broker: connect
//! idempotency, subscribe policies, reconnect ordering, delivery ordering,
//! and concurrency safety.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use pager_net::testing::{MockBroker, MockOp};
use pager_net::{ReconnectPolicy, Session, SessionConfig, SessionEvent, SubscribePolicy};
use pager_shared::error::{PublishError, SubscriptionErrorKind};
use pager_shared::types::{ConnectionState, Topic, TopicNamespace};

const WAIT: Duration = Duration::from_secs(5);

fn fast_config(subscribe_policy: SubscribePolicy) -> SessionConfig {
    SessionConfig {
        reconnect: ReconnectPolicy {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(50),
            multiplier: 2.0,
            jitter: 0.0,
        },
        subscribe_policy,
        event_buffer: 4096,
    }
}

fn alerts(name: &str) -> Topic {
    Topic::new(TopicNamespace::Alerts, name).unwrap()
}

async fn next_event(rx: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for session event")
        .expect("session event stream closed")
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let broker = MockBroker::new();
    let session = Session::spawn(fast_config(SubscribePolicy::Queue), broker.clone());

    session.connect().await.unwrap();
    session.connect().await.unwrap();

    assert_eq!(broker.connect_count(), 1);
    assert_eq!(session.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_initial_connect_failure_is_returned() {
    let broker = MockBroker::new();
    broker.fail_next_connects(1);
    let session = Session::spawn(fast_config(SubscribePolicy::Queue), broker.clone());

    assert!(session.connect().await.is_err());
    assert_eq!(session.state(), ConnectionState::Errored);

    // The caller owns the retry for explicit connects.
    session.connect().await.unwrap();
    assert_eq!(session.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_subscribe_rejected_while_disconnected() {
    let broker = MockBroker::new();
    let session = Session::spawn(fast_config(SubscribePolicy::Reject), broker.clone());

    let err = session.subscribe(&alerts("alice")).await.unwrap_err();
    assert_eq!(err.topic, "alerts/alice");
    assert!(matches!(err.kind, SubscriptionErrorKind::Disconnected));
    assert_eq!(broker.subscriber_count("alerts/alice"), 0);
}

#[tokio::test]
async fn test_subscribe_queued_while_disconnected() {
    let broker = MockBroker::new();
    let session = Session::spawn(fast_config(SubscribePolicy::Queue), broker.clone());

    session.subscribe(&alerts("alice")).await.unwrap();
    assert_eq!(broker.subscriber_count("alerts/alice"), 0);

    session.connect().await.unwrap();
    assert_eq!(broker.subscriber_count("alerts/alice"), 1);
}

#[tokio::test]
async fn test_subscribe_is_idempotent() {
    let broker = MockBroker::new();
    let session = Session::spawn(fast_config(SubscribePolicy::Queue), broker.clone());
    session.connect().await.unwrap();

    let topic = alerts("alice");
    session.subscribe(&topic).await.unwrap();
    session.subscribe(&topic).await.unwrap();

    let subscribes = broker
        .ops()
        .into_iter()
        .filter(|op| matches!(op, MockOp::Subscribe(_)))
        .count();
    assert_eq!(subscribes, 1);
}

#[tokio::test]
async fn test_publish_fails_while_disconnected() {
    let broker = MockBroker::new();
    let session = Session::spawn(fast_config(SubscribePolicy::Queue), broker.clone());

    let err = session
        .publish(&alerts("bob"), "hello")
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::Disconnected { .. }));
    assert!(broker.published().is_empty());
}

#[tokio::test]
async fn test_reconnect_resubscribes_before_connected_event() {
    let broker = MockBroker::new();
    let session = Session::spawn(fast_config(SubscribePolicy::Queue), broker.clone());
    session.connect().await.unwrap();
    session.subscribe(&alerts("alice")).await.unwrap();

    let mut rx = session.events();
    broker.drop_all_connections("broker crashed").await;

    match next_event(&mut rx).await {
        SessionEvent::Disconnected { reason } => assert_eq!(reason, "broker crashed"),
        other => panic!("expected Disconnected, got {other:?}"),
    }
    assert_eq!(broker.subscriber_count("alerts/alice"), 0);

    loop {
        match next_event(&mut rx).await {
            SessionEvent::Connected => break,
            SessionEvent::Error { .. } => continue,
            other => panic!("expected Connected, got {other:?}"),
        }
    }

    // By the time any listener hears Connected the subscription is back.
    assert_eq!(broker.subscriber_count("alerts/alice"), 1);
    assert_eq!(broker.connect_count(), 2);
}

#[tokio::test]
async fn test_reconnect_retries_until_broker_returns() {
    let broker = MockBroker::new();
    let session = Session::spawn(fast_config(SubscribePolicy::Queue), broker.clone());
    session.connect().await.unwrap();
    session.subscribe(&alerts("alice")).await.unwrap();

    let mut rx = session.events();
    broker.fail_next_connects(3);
    broker.drop_all_connections("transient outage").await;

    let mut errors = 0;
    loop {
        match next_event(&mut rx).await {
            SessionEvent::Connected => break,
            SessionEvent::Error { .. } => errors += 1,
            SessionEvent::Disconnected { .. } => {}
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(errors, 3);
    assert_eq!(broker.subscriber_count("alerts/alice"), 1);
}

#[tokio::test]
async fn test_inbound_events_preserve_order() {
    let broker = MockBroker::new();
    let session = Session::spawn(fast_config(SubscribePolicy::Queue), broker.clone());
    session.connect().await.unwrap();
    session.subscribe(&alerts("alice")).await.unwrap();

    let mut rx = session.events();
    for i in 0..100 {
        let delivered = broker.deliver("alerts/alice", format!("event-{i}")).await;
        assert_eq!(delivered, 1);
    }

    for i in 0..100 {
        match next_event(&mut rx).await {
            SessionEvent::MessageReceived(ev) => {
                assert_eq!(ev.topic, "alerts/alice");
                assert_eq!(ev.payload.as_ref(), format!("event-{i}").as_bytes());
            }
            other => panic!("expected MessageReceived, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_concurrent_inbound_and_publish() {
    let broker = MockBroker::new();
    let session = Session::spawn(fast_config(SubscribePolicy::Queue), broker.clone());
    session.connect().await.unwrap();
    session.subscribe(&alerts("alice")).await.unwrap();

    let mut rx = session.events();
    let counter = tokio::spawn(async move {
        let mut seen = 0u32;
        while seen < 1000 {
            match rx.recv().await {
                Ok(SessionEvent::MessageReceived(_)) => seen += 1,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    panic!("listener lagged by {n} events")
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        seen
    });

    let inbound_broker = broker.clone();
    let inbound = tokio::spawn(async move {
        for i in 0..1000 {
            inbound_broker
                .deliver("alerts/alice", format!("in-{i}"))
                .await;
        }
    });

    let publisher_session = session.clone();
    let out_topic = alerts("bob");
    let outbound = tokio::spawn(async move {
        for i in 0..1000 {
            publisher_session
                .publish(&out_topic, format!("out-{i}"))
                .await
                .unwrap();
        }
    });

    inbound.await.unwrap();
    outbound.await.unwrap();

    let seen = timeout(WAIT, counter).await.unwrap().unwrap();
    assert_eq!(seen, 1000);
    assert_eq!(broker.published().len(), 1000);
    assert_eq!(broker.subscriber_count("alerts/bob"), 0);
}

#[tokio::test]
async fn test_shutdown_cancels_reconnect_and_events() {
    let broker = MockBroker::new();
    let session = Session::spawn(fast_config(SubscribePolicy::Queue), broker.clone());
    session.connect().await.unwrap();

    let mut rx = session.events();
    session.shutdown();
    broker.drop_all_connections("broker crashed").await;

    tokio::time::sleep(Duration::from_millis(200)).await;

    // No reconnect attempt ran and nothing was emitted after teardown.
    assert_eq!(broker.connect_count(), 1);
    assert!(matches!(
        rx.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
}
