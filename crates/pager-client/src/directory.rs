//! User directory client: lookup, registration and login against the
//! backend's user API. Populates the identity context before the session
//! core engages; the core itself never calls this.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A directory entry, as returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: Uuid,
    pub name: String,
}

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Directory request failed: {0}")]
    Request(String),

    #[error("Directory returned {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid directory response: {0}")]
    InvalidResponse(String),
}

#[derive(Serialize)]
struct UsernameBody<'a> {
    username: &'a str,
}

pub struct DirectoryClient {
    http: reqwest::Client,
    base_url: String,
}

impl DirectoryClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, DirectoryError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DirectoryError::Request(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    pub async fn register(&self, username: &str) -> Result<UserRecord, DirectoryError> {
        let response = self
            .http
            .post(self.url("/user/v1/register"))
            .json(&UsernameBody { username })
            .send()
            .await
            .map_err(|e| DirectoryError::Request(e.to_string()))?;
        Self::parse(response).await
    }

    pub async fn login(&self, username: &str) -> Result<UserRecord, DirectoryError> {
        let response = self
            .http
            .post(self.url("/user/v1/login"))
            .json(&UsernameBody { username })
            .send()
            .await
            .map_err(|e| DirectoryError::Request(e.to_string()))?;
        Self::parse(response).await
    }

    pub async fn user_by_id(&self, id: Uuid) -> Result<UserRecord, DirectoryError> {
        let response = self
            .http
            .get(self.url(&format!("/user/v1/id/{id}")))
            .send()
            .await
            .map_err(|e| DirectoryError::Request(e.to_string()))?;
        Self::parse(response).await
    }

    pub async fn all_users(&self) -> Result<Vec<UserRecord>, DirectoryError> {
        let response = self
            .http
            .get(self.url("/user/v1/all"))
            .send()
            .await
            .map_err(|e| DirectoryError::Request(e.to_string()))?;
        Self::parse(response).await
    }

    pub async fn delete_user(&self, id: Uuid) -> Result<(), DirectoryError> {
        let response = self
            .http
            .delete(self.url(&format!("/user/v1/{id}")))
            .send()
            .await
            .map_err(|e| DirectoryError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DirectoryError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, DirectoryError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DirectoryError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json()
            .await
            .map_err(|e| DirectoryError::InvalidResponse(e.to_string()))
    }
}
