//! HTTP client for the tinyfront backend.
//!
//! `GET /` is unauthenticated; `GET /user` and `GET /admin` need a bearer
//! token for the backend's `access_as_user` scope. The authenticated calls
//! take an [`AccessToken`], so there is no way to reach them without a
//! token from the session gate.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client};
use tracing::debug;

use crate::auth::AccessToken;
use crate::models::{HealthStatus, UserEnvelope, UserInfo};

use super::ApiError;

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Backend API client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    /// `GET /`
    pub async fn health(&self) -> Result<HealthStatus> {
        let url = self.url("/");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ApiError::from)
            .context("Failed to send health check request")?;

        let response = Self::check_response(response).await?;
        let body = response
            .text()
            .await
            .context("Failed to read health check response body")?;
        debug!("Health check response received");

        Ok(HealthStatus::from_body(&body))
    }

    /// `GET /user`
    pub async fn user_info(&self, token: &AccessToken) -> Result<UserInfo> {
        self.get_user("/user", token).await
    }

    /// `GET /admin`; fails with [`ApiError::AccessDenied`] for non-admins.
    pub async fn admin_info(&self, token: &AccessToken) -> Result<UserInfo> {
        self.get_user("/admin", token).await
    }

    async fn get_user(&self, path: &str, token: &AccessToken) -> Result<UserInfo> {
        let url = self.url(path);
        let response = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/json")
            .bearer_auth(token.secret())
            .send()
            .await
            .map_err(ApiError::from)
            .with_context(|| format!("Failed to send GET request to {}", url))?;

        let response = Self::check_response(response).await?;
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read response from {}", url))?;
        let envelope: UserEnvelope = serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
            .with_context(|| format!("Failed to parse JSON response from {}", url))?;

        Ok(envelope.user)
    }
}
