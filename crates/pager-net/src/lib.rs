// Broker session layer: one long-lived pub/sub connection per client,
// with autonomous reconnection and lifecycle event fan-out.

pub mod backoff;
pub mod gossip;
pub mod session;
pub mod testing;
pub mod transport;

pub use backoff::ReconnectPolicy;
pub use gossip::{build_swarm, GossipConfig, GossipTransport, PagerBehaviour, PagerEvent};
pub use session::{Session, SessionConfig, SessionEvent, SubscribePolicy};
pub use transport::{BrokerTransport, TransportCommand, TransportConn, TransportEvent};
