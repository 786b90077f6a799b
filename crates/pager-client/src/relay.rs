//! The backend relay: a synchronous "deliver message" request the dispatcher
//! uses instead of publishing directly, when so configured.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use pager_shared::error::RelayError;

/// Object seam for the relay call so tests can record traffic without a
/// backend.
#[async_trait]
pub trait RelaySender: Send + Sync {
    /// Ask the backend to deliver `message` to `target`'s inbox topic.
    async fn send_message(&self, target: &str, message: &str) -> Result<(), RelayError>;
}

/// HTTP relay client against the notify API.
pub struct RelayClient {
    http: reqwest::Client,
    base_url: String,
}

impl RelayClient {
    /// The timeout bounds the whole request; the relay call must never hang
    /// the send path.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Request(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl RelaySender for RelayClient {
    async fn send_message(&self, target: &str, message: &str) -> Result<(), RelayError> {
        let url = format!(
            "{}/notify/v1/send/message",
            self.base_url.trim_end_matches('/')
        );
        debug!(target = %target, "Relaying message through backend");

        let response = self
            .http
            .post(&url)
            .query(&[("topic", target), ("message", message)])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RelayError::Timeout
                } else {
                    RelayError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RelayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}
