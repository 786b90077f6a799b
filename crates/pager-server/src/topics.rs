//! Topic mirroring bookkeeping for the hub node.
//!
//! Clients only connect to the hub, so the hub must be a mesh member of
//! every topic any client subscribes to, or publishes would never be
//! forwarded between them. This tracks which peers subscribe to which
//! topics so the hub joins a topic on first interest and leaves it when the
//! last subscriber goes away.

use std::collections::{HashMap, HashSet};

use libp2p::PeerId;
use tracing::debug;

#[derive(Debug, Default)]
pub struct TopicMirror {
    topics: HashMap<String, HashSet<PeerId>>,
}

impl TopicMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a peer's subscription. Returns true when the topic had no
    /// subscribers before, i.e. the hub should join it now.
    pub fn on_subscribed(&mut self, peer: PeerId, topic: &str) -> bool {
        let subscribers = self.topics.entry(topic.to_string()).or_default();
        let first = subscribers.is_empty();
        subscribers.insert(peer);
        debug!(peer = %peer, topic = %topic, first, "Peer subscribed");
        first
    }

    /// Record a peer dropping a subscription. Returns true when the topic
    /// has no subscribers left, i.e. the hub should leave it.
    pub fn on_unsubscribed(&mut self, peer: &PeerId, topic: &str) -> bool {
        match self.topics.get_mut(topic) {
            Some(subscribers) => {
                subscribers.remove(peer);
                if subscribers.is_empty() {
                    self.topics.remove(topic);
                    debug!(topic = %topic, "Topic has no subscribers left");
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }

    /// Drop every subscription of a disconnected peer. Returns the topics
    /// that became empty.
    pub fn on_peer_gone(&mut self, peer: &PeerId) -> Vec<String> {
        let mut emptied = Vec::new();
        self.topics.retain(|topic, subscribers| {
            subscribers.remove(peer);
            if subscribers.is_empty() {
                emptied.push(topic.clone());
                false
            } else {
                true
            }
        });
        if !emptied.is_empty() {
            debug!(peer = %peer, count = emptied.len(), "Peer left, topics emptied");
        }
        emptied
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, HashSet::len)
    }

    pub fn active_topic_count(&self) -> usize {
        self.topics.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_peer() -> PeerId {
        PeerId::random()
    }

    #[test]
    fn test_first_subscriber_triggers_join() {
        let mut mirror = TopicMirror::new();
        let p1 = test_peer();
        let p2 = test_peer();

        assert!(mirror.on_subscribed(p1, "alerts/alice"));
        assert!(!mirror.on_subscribed(p2, "alerts/alice"));
        assert_eq!(mirror.subscriber_count("alerts/alice"), 2);
    }

    #[test]
    fn test_last_unsubscribe_triggers_leave() {
        let mut mirror = TopicMirror::new();
        let p1 = test_peer();
        let p2 = test_peer();
        mirror.on_subscribed(p1, "alerts/alice");
        mirror.on_subscribed(p2, "alerts/alice");

        assert!(!mirror.on_unsubscribed(&p1, "alerts/alice"));
        assert!(mirror.on_unsubscribed(&p2, "alerts/alice"));
        assert_eq!(mirror.active_topic_count(), 0);
    }

    #[test]
    fn test_unknown_topic_is_noop() {
        let mut mirror = TopicMirror::new();
        assert!(!mirror.on_unsubscribed(&test_peer(), "alerts/nobody"));
    }

    #[test]
    fn test_peer_gone_empties_its_topics() {
        let mut mirror = TopicMirror::new();
        let p1 = test_peer();
        let p2 = test_peer();
        mirror.on_subscribed(p1, "alerts/alice");
        mirror.on_subscribed(p1, "alerts/bob");
        mirror.on_subscribed(p2, "alerts/bob");

        let mut emptied = mirror.on_peer_gone(&p1);
        emptied.sort();
        assert_eq!(emptied, vec!["alerts/alice".to_string()]);
        assert_eq!(mirror.subscriber_count("alerts/bob"), 1);
    }
}
