//! Client configuration loaded from environment variables.
//!
//! All settings have defaults matching the reference deployment, so a client
//! can start with zero configuration for local development.

use std::time::Duration;

use pager_net::SubscribePolicy;
use pager_shared::constants::{CONNECT_TIMEOUT_MS, DEFAULT_QUIC_PORT, HTTP_TIMEOUT_MS};
use pager_shared::types::TopicNamespace;

use crate::dispatcher::SendStrategy;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Multiaddr of the broker node.
    /// Env: `PAGER_BROKER_ADDR`
    /// Default: `/ip4/127.0.0.1/udp/4001/quic-v1`
    pub broker_addr: String,

    /// Topic namespace for inbox topics (`alerts` or `messages`).
    /// Env: `PAGER_NAMESPACE`
    /// Default: `alerts`
    pub namespace: TopicNamespace,

    /// How outbound sends leave the client (`publish` or `relay`).
    /// Env: `PAGER_SEND_STRATEGY`
    /// Default: `relay` (the reference deployment always posts to the
    /// backend and never echoes locally).
    pub send_strategy: SendStrategy,

    /// What `subscribe` does while disconnected (`queue` or `reject`).
    /// Env: `PAGER_SUBSCRIBE_POLICY`
    /// Default: `queue`
    pub subscribe_policy: SubscribePolicy,

    /// Base URL of the notify/relay API.
    /// Env: `PAGER_RELAY_URL`
    /// Default: `http://localhost:8082`
    pub relay_url: String,

    /// Base URL of the user directory API.
    /// Env: `PAGER_DIRECTORY_URL`
    /// Default: same as the relay URL.
    pub directory_url: String,

    /// Timeout for relay and directory HTTP requests.
    /// Env: `PAGER_HTTP_TIMEOUT_MS`
    pub http_timeout: Duration,

    /// Timeout for a single broker connect attempt.
    /// Env: `PAGER_CONNECT_TIMEOUT_MS`
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            broker_addr: format!("/ip4/127.0.0.1/udp/{DEFAULT_QUIC_PORT}/quic-v1"),
            namespace: TopicNamespace::Alerts,
            send_strategy: SendStrategy::Relay,
            subscribe_policy: SubscribePolicy::Queue,
            relay_url: "http://localhost:8082".to_string(),
            directory_url: "http://localhost:8082".to_string(),
            http_timeout: Duration::from_millis(HTTP_TIMEOUT_MS),
            connect_timeout: Duration::from_millis(CONNECT_TIMEOUT_MS),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("PAGER_BROKER_ADDR") {
            config.broker_addr = addr;
        }

        if let Ok(ns) = std::env::var("PAGER_NAMESPACE") {
            match ns.parse() {
                Ok(parsed) => config.namespace = parsed,
                Err(e) => {
                    tracing::warn!(value = %ns, error = %e, "Invalid PAGER_NAMESPACE, using default");
                }
            }
        }

        if let Ok(strategy) = std::env::var("PAGER_SEND_STRATEGY") {
            match strategy.parse() {
                Ok(parsed) => config.send_strategy = parsed,
                Err(e) => {
                    tracing::warn!(
                        value = %strategy,
                        error = %e,
                        "Invalid PAGER_SEND_STRATEGY, using default"
                    );
                }
            }
        }

        if let Ok(policy) = std::env::var("PAGER_SUBSCRIBE_POLICY") {
            match policy.parse() {
                Ok(parsed) => config.subscribe_policy = parsed,
                Err(e) => {
                    tracing::warn!(
                        value = %policy,
                        error = %e,
                        "Invalid PAGER_SUBSCRIBE_POLICY, using default"
                    );
                }
            }
        }

        if let Ok(url) = std::env::var("PAGER_RELAY_URL") {
            config.relay_url = url.clone();
            // The directory usually lives on the same backend.
            config.directory_url = url;
        }

        if let Ok(url) = std::env::var("PAGER_DIRECTORY_URL") {
            config.directory_url = url;
        }

        if let Ok(ms) = std::env::var("PAGER_HTTP_TIMEOUT_MS") {
            match ms.parse::<u64>() {
                Ok(n) => config.http_timeout = Duration::from_millis(n),
                Err(_) => {
                    tracing::warn!(value = %ms, "Invalid PAGER_HTTP_TIMEOUT_MS, using default");
                }
            }
        }

        if let Ok(ms) = std::env::var("PAGER_CONNECT_TIMEOUT_MS") {
            match ms.parse::<u64>() {
                Ok(n) => config.connect_timeout = Duration::from_millis(n),
                Err(_) => {
                    tracing::warn!(value = %ms, "Invalid PAGER_CONNECT_TIMEOUT_MS, using default");
                }
            }
        }

        config
    }
}
