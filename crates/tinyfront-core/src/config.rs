//! Application configuration.
//!
//! Identity-provider settings come from the environment (a `.env` file is
//! loaded by the binary before this runs). The redirect URI is fixed to the
//! local development origin.
//!
//! Session files are stored under `<cache dir>/tinyfront/<tenant>/`.

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Application name used for cache directory paths
const APP_NAME: &str = "tinyfront";

/// Redirect URI registered for the frontend app registration.
pub const REDIRECT_URI: &str = "http://localhost:5173";

/// Default Entra ID authority host
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Default backend base URL (local development server)
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000";

/// Scope exposed by the backend app registration.
const API_SCOPE_NAME: &str = "access_as_user";

pub const ENV_FRONTEND_CLIENT_ID: &str = "TINYFRONT_FRONTEND_CLIENT_ID";
pub const ENV_BACKEND_CLIENT_ID: &str = "TINYFRONT_BACKEND_CLIENT_ID";
pub const ENV_TENANT_ID: &str = "TINYFRONT_TENANT_ID";
pub const ENV_AUTHORITY_HOST: &str = "TINYFRONT_AUTHORITY_HOST";
pub const ENV_API_BASE_URL: &str = "TINYFRONT_API_BASE_URL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Client ID of the public (frontend) app registration
    pub frontend_client_id: String,
    /// Client ID of the backend app registration; forms the API scope
    pub backend_client_id: String,
    pub tenant_id: String,
    pub authority_host: String,
    pub api_base_url: String,
}

impl Config {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .with_context(|| format!("Missing required environment variable {}", key))
        };

        let optional = |key: &str, default: &str| -> String {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Self {
            frontend_client_id: required(ENV_FRONTEND_CLIENT_ID)?,
            backend_client_id: required(ENV_BACKEND_CLIENT_ID)?,
            tenant_id: required(ENV_TENANT_ID)?,
            authority_host: optional(ENV_AUTHORITY_HOST, DEFAULT_AUTHORITY_HOST)
                .trim_end_matches('/')
                .to_string(),
            api_base_url: optional(ENV_API_BASE_URL, DEFAULT_API_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    /// Authority URL for the configured tenant, e.g.
    /// `https://login.microsoftonline.com/<tenant>`
    pub fn authority(&self) -> String {
        format!("{}/{}", self.authority_host, self.tenant_id)
    }

    /// OpenID issuer for the tenant's v2.0 endpoints; discovery starts here.
    pub fn issuer(&self) -> String {
        format!("{}/v2.0", self.authority())
    }

    /// Scope required by the backend's `/user` and `/admin` endpoints.
    pub fn api_scope(&self) -> String {
        format!("api://{}/{}", self.backend_client_id, API_SCOPE_NAME)
    }

    pub fn redirect_uri(&self) -> &'static str {
        REDIRECT_URI
    }

    /// Directory holding the persisted session and pending-redirect marker.
    pub fn session_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME).join(&self.tenant_id))
    }

    /// Directory for log files. Independent of the tenant, so logging can
    /// start before the configuration is loaded.
    pub fn log_dir() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME).join("logs"))
    }
}
