/// Protocol version string for libp2p identify
pub const PROTOCOL_VERSION: &str = "/pager/1.0.0";

/// Application name
pub const APP_NAME: &str = "Pager";

/// Sender label used for optimistic local-echo entries in the message log
pub const LOCAL_ECHO_SENDER: &str = "You";

/// Maximum notification payload size in bytes (64 KiB)
pub const MAX_PAYLOAD_SIZE: usize = 65_536;

/// GossipSub heartbeat interval in seconds
pub const GOSSIPSUB_HEARTBEAT_SECS: u64 = 1;

/// Default QUIC port the broker listens on
pub const DEFAULT_QUIC_PORT: u16 = 4001;

/// Default HTTP API port (server), matching the original deployment
pub const DEFAULT_HTTP_PORT: u16 = 8082;

/// Capacity of session/transport command channels
pub const COMMAND_BUFFER: usize = 256;

/// Capacity of the transport event channel
pub const TRANSPORT_EVENT_BUFFER: usize = 1024;

/// Capacity of the session's broadcast event channel
pub const SESSION_EVENT_BUFFER: usize = 2048;

/// Default initial reconnect delay in milliseconds
pub const RECONNECT_INITIAL_MS: u64 = 500;

/// Default reconnect delay cap in milliseconds
pub const RECONNECT_MAX_MS: u64 = 30_000;

/// Default timeout for relay/directory HTTP requests in milliseconds
pub const HTTP_TIMEOUT_MS: u64 = 5_000;

/// Default timeout for a single broker connect attempt in milliseconds
pub const CONNECT_TIMEOUT_MS: u64 = 10_000;
