//! Thin client for the hub's REST API.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;

use homedash_domain::connection::HubConfig;

use crate::error::HttpError;

/// Status and decoded body of one REST call.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    /// JSON body, or `Value::Null` when the body is empty or not JSON.
    pub body: Value,
}

impl Reply {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// The hub refused the bearer token.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
    }
}

/// Authenticated access to `/api/...` endpoints.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
}

impl RestClient {
    /// Build a client whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Client`] when the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> Result<Self, HttpError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(HttpError::Client)?;
        Ok(Self { http })
    }

    /// `GET <base>/<path>` with a bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Request`] when no response was received.
    pub async fn get(&self, hub: &HubConfig, token: &str, path: &str) -> Result<Reply, HttpError> {
        let url = hub.api_url(path);
        tracing::debug!(%url, "GET");
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(HttpError::Request)?;
        Self::read(response).await
    }

    /// `POST <base>/<path>` with a JSON body and a bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Request`] when no response was received.
    pub async fn post(
        &self,
        hub: &HubConfig,
        token: &str,
        path: &str,
        body: &Value,
    ) -> Result<Reply, HttpError> {
        let url = hub.api_url(path);
        tracing::debug!(%url, "POST");
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(HttpError::Request)?;
        Self::read(response).await
    }

    async fn read(response: reqwest::Response) -> Result<Reply, HttpError> {
        let status = response.status();
        let bytes = response.bytes().await.map_err(HttpError::Request)?;
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Ok(Reply { status, body })
    }
}
