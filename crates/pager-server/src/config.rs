//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;

use pager_shared::constants::DEFAULT_HTTP_PORT;
use pager_shared::types::TopicNamespace;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// libp2p multiaddr the broker node listens on (QUIC).
    /// Env: `LISTEN_ADDR`
    /// Default: `/ip4/0.0.0.0/udp/4001/quic-v1`
    pub listen_addr: String,

    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8082`
    pub http_addr: SocketAddr,

    /// Topic namespace relayed sends are published into.
    /// Env: `PAGER_NAMESPACE`
    /// Default: `alerts`
    pub namespace: TopicNamespace,

    /// Human-readable name for this instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Pager Hub"`
    pub instance_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "/ip4/0.0.0.0/udp/4001/quic-v1".to_string(),
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            namespace: TopicNamespace::Alerts,
            instance_name: "Pager Hub".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(ns) = std::env::var("PAGER_NAMESPACE") {
            match ns.parse() {
                Ok(parsed) => config.namespace = parsed,
                Err(e) => {
                    tracing::warn!(value = %ns, error = %e, "Invalid PAGER_NAMESPACE, using default");
                }
            }
        }

        if let Ok(name) = std::env::var("INSTANCE_NAME") {
            config.instance_name = name;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8082).into());
        assert_eq!(config.namespace, TopicNamespace::Alerts);
    }
}
