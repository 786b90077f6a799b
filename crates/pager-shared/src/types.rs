use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

// Opaque user identifier assigned by the user directory
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Namespace prefix for per-identity inbox topics.
///
/// Deployments use either `alerts` or `messages`; which one is a
/// configuration choice, never decided per call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TopicNamespace {
    Alerts,
    Messages,
}

impl TopicNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicNamespace::Alerts => "alerts",
            TopicNamespace::Messages => "messages",
        }
    }
}

impl std::str::FromStr for TopicNamespace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "alerts" => Ok(TopicNamespace::Alerts),
            "messages" => Ok(TopicNamespace::Messages),
            other => Err(format!("unknown topic namespace: {other}")),
        }
    }
}

impl std::fmt::Display for TopicNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-identity inbox topic, rendered as `<namespace>/<name>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Topic {
    namespace: TopicNamespace,
    name: String,
}

impl Topic {
    /// Build the inbox topic for a recipient name within a namespace.
    ///
    /// The name must be non-empty after trimming and must not contain `/`,
    /// which would make the rendered topic ambiguous to parse.
    pub fn new(namespace: TopicNamespace, name: &str) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyRecipient);
        }
        if name.contains('/') {
            return Err(ValidationError::InvalidRecipient(name.to_string()));
        }
        Ok(Self {
            namespace,
            name: name.to_string(),
        })
    }

    /// Parse a raw topic string back into namespace and name.
    pub fn parse(raw: &str) -> Option<Self> {
        let (ns, name) = raw.split_once('/')?;
        let namespace: TopicNamespace = ns.parse().ok()?;
        Topic::new(namespace, name).ok()
    }

    pub fn namespace(&self) -> TopicNamespace {
        self.namespace
    }

    /// The identity-name segment of the topic.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace.as_str(), self.name)
    }
}

/// Connection state of the broker session, published through a watch channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Errored,
}

/// A raw delivery from the broker, before reconciliation.
///
/// The broker does not stamp deliveries, so `received_at` is assigned
/// locally the moment the event is surfaced by the transport.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub topic: String,
    pub payload: Bytes,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageOrigin {
    Inbound,
    LocalEcho,
}

/// A reconciled entry in the message log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub from: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
    pub origin: MessageOrigin,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_render() {
        let topic = Topic::new(TopicNamespace::Alerts, "alice").unwrap();
        assert_eq!(topic.to_string(), "alerts/alice");
        assert_eq!(topic.name(), "alice");
    }

    #[test]
    fn test_topic_trims_name() {
        let topic = Topic::new(TopicNamespace::Messages, "  bob ").unwrap();
        assert_eq!(topic.to_string(), "messages/bob");
    }

    #[test]
    fn test_topic_rejects_empty_name() {
        assert!(matches!(
            Topic::new(TopicNamespace::Alerts, "   "),
            Err(ValidationError::EmptyRecipient)
        ));
    }

    #[test]
    fn test_topic_rejects_slash() {
        assert!(matches!(
            Topic::new(TopicNamespace::Alerts, "a/b"),
            Err(ValidationError::InvalidRecipient(_))
        ));
    }

    #[test]
    fn test_topic_parse_roundtrip() {
        let topic = Topic::parse("alerts/carol").unwrap();
        assert_eq!(topic.namespace(), TopicNamespace::Alerts);
        assert_eq!(topic.name(), "carol");
        assert_eq!(Topic::parse(&topic.to_string()), Some(topic));
    }

    #[test]
    fn test_topic_parse_rejects_unknown_namespace() {
        assert!(Topic::parse("channels/carol").is_none());
        assert!(Topic::parse("no-separator").is_none());
    }

    #[test]
    fn test_namespace_from_str() {
        assert_eq!(
            "Alerts".parse::<TopicNamespace>().unwrap(),
            TopicNamespace::Alerts
        );
        assert_eq!(
            " messages ".parse::<TopicNamespace>().unwrap(),
            TopicNamespace::Messages
        );
        assert!("mail".parse::<TopicNamespace>().is_err());
    }
}
