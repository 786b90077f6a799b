// Client-side notification core: binds the logged-in identity to its inbox
// topic, reconciles broker deliveries into an ordered message log, and
// dispatches outbound sends by broker publish or backend relay.

pub mod binder;
pub mod client;
pub mod config;
pub mod directory;
pub mod dispatcher;
pub mod events;
pub mod log;
pub mod reconciler;
pub mod relay;

pub use binder::TopicBinder;
pub use client::Client;
pub use config::ClientConfig;
pub use directory::{DirectoryClient, DirectoryError, UserRecord};
pub use dispatcher::{OutboundDispatcher, SendStrategy};
pub use events::ClientEvent;
pub use log::MessageLog;
pub use relay::{RelayClient, RelaySender};
