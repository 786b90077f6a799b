// Shared types for the pager notification system: identities, topics,
// messages, and the error taxonomy used across the client and server crates.

pub mod constants;
pub mod error;
pub mod identity;
pub mod types;

pub use error::{
    ConnectionError, IdentityError, PagerError, PublishError, RelayError, SendError,
    SubscriptionError, SubscriptionErrorKind, ValidationError,
};
pub use identity::Identity;
pub use types::{
    ConnectionState, Message, MessageOrigin, NotificationEvent, Topic, TopicNamespace, UserId,
};
