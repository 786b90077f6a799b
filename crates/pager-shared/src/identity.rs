use serde::{Deserialize, Serialize};

use crate::error::IdentityError;
use crate::types::{Topic, TopicNamespace, UserId};

/// The logical user bound to a session.
///
/// Immutable for the lifetime of the session: set at login, discarded at
/// logout. The name doubles as the identity's topic-namespace key, so it
/// obeys the same character rules as a topic segment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    name: String,
    id: UserId,
}

impl Identity {
    pub fn new(name: &str, id: UserId) -> Result<Self, IdentityError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(IdentityError::EmptyName);
        }
        if name.contains('/') {
            return Err(IdentityError::InvalidName(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            id,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> UserId {
        self.id
    }

    /// The topic this identity receives notifications on.
    ///
    /// Infallible: the name was validated at construction with the same
    /// rules `Topic::new` applies.
    pub fn inbox_topic(&self, namespace: TopicNamespace) -> Topic {
        Topic::new(namespace, &self.name).expect("identity name validated at construction")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_rejects_empty_name() {
        assert!(matches!(
            Identity::new("  ", UserId::new()),
            Err(IdentityError::EmptyName)
        ));
    }

    #[test]
    fn test_identity_rejects_slash() {
        assert!(matches!(
            Identity::new("a/b", UserId::new()),
            Err(IdentityError::InvalidName(_))
        ));
    }

    #[test]
    fn test_inbox_topic() {
        let identity = Identity::new("alice", UserId::new()).unwrap();
        assert_eq!(
            identity.inbox_topic(TopicNamespace::Alerts).to_string(),
            "alerts/alice"
        );
        assert_eq!(
            identity.inbox_topic(TopicNamespace::Messages).to_string(),
            "messages/alice"
        );
    }
}
