use thiserror::Error;

#[derive(Error, Debug)]
pub enum PagerError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Subscription error: {0}")]
    Subscription(#[from] SubscriptionError),

    #[error("Send error: {0}")]
    Send(#[from] SendError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),
}

/// Failure to establish a broker connection. Fatal to the current attempt;
/// the session's backoff loop owns retries, callers only decide whether to
/// retry an explicit `connect()`.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Broker unreachable at {addr}: {reason}")]
    Unreachable { addr: String, reason: String },

    #[error("Broker rejected credentials")]
    CredentialsRejected,

    #[error("Connect attempt timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Session is shut down")]
    ShutDown,
}

#[derive(Error, Debug)]
#[error("Subscription to {topic} failed: {kind}")]
pub struct SubscriptionError {
    pub topic: String,
    pub kind: SubscriptionErrorKind,
}

#[derive(Error, Debug)]
pub enum SubscriptionErrorKind {
    #[error("session is disconnected")]
    Disconnected,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("session is shut down")]
    SessionClosed,
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Cannot publish to {topic}: session is disconnected")]
    Disconnected { topic: String },

    #[error("Transport refused publish to {topic}: {reason}")]
    Transport { topic: String, reason: String },

    #[error("Session is shut down")]
    SessionClosed,
}

/// Rejected locally before any broker or relay traffic.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Recipient must not be empty")]
    EmptyRecipient,

    #[error("Recipient must not contain '/': {0}")]
    InvalidRecipient(String),

    #[error("Message body must not be empty")]
    EmptyBody,
}

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Relay request timed out")]
    Timeout,

    #[error("Relay returned {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Relay request failed: {0}")]
    Request(String),
}

/// Outcome of a `send` through the outbound dispatcher, whichever strategy
/// is configured.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error("Relay failed: {0}")]
    Relay(#[from] RelayError),
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Identity name must not be empty")]
    EmptyName,

    #[error("Identity name must not contain '/': {0}")]
    InvalidName(String),
}
