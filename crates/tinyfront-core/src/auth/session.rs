use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Session file name in the session directory
const SESSION_FILE: &str = "session.json";

/// Marker written before handing control to the identity provider
const PENDING_REDIRECT_FILE: &str = "pending_redirect.json";

/// A sign-in that has not come back within this window is abandoned.
/// Matches the lifetime of an authorization code request at the provider.
const PENDING_REDIRECT_TTL_MINUTES: i64 = 10;

/// The signed-in principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// `<object id>.<tenant id>`
    pub home_account_id: String,
    pub tenant_id: String,
    /// `preferred_username` claim, usually the sign-in email
    pub username: String,
    pub name: Option<String>,
}

impl Account {
    /// First word of the display name, falling back to the username.
    pub fn first_name(&self) -> &str {
        self.name
            .as_deref()
            .and_then(|n| n.split_whitespace().next())
            .unwrap_or(&self.username)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub account: Account,
    pub created_at: DateTime<Utc>,
}

impl SessionData {
    pub fn new(account: Account) -> Self {
        Self {
            account,
            created_at: Utc::now(),
        }
    }
}

/// What the application was doing when it handed control to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RedirectPurpose {
    Login,
    AcquireToken {
        scope: String,
        /// Opaque value handed back after the redirect so the caller can
        /// resume what it was doing.
        app_state: Option<String>,
    },
}

/// Persisted continuation for an interactive redirect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRedirect {
    pub state: String,
    pub code_verifier: String,
    pub nonce: String,
    pub scopes: Vec<String>,
    pub purpose: RedirectPurpose,
    pub created_at: DateTime<Utc>,
}

impl PendingRedirect {
    pub fn is_expired(&self) -> bool {
        let expiry = self.created_at + Duration::minutes(PENDING_REDIRECT_TTL_MINUTES);
        Utc::now() > expiry
    }
}

/// On-disk storage for the session record and the pending-redirect marker.
///
/// Secrets are not kept here; refresh tokens go to a
/// [`SecretStore`](super::SecretStore).
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load the persisted session, if any.
    pub fn load_session(&self) -> Result<Option<SessionData>> {
        read_json(&self.dir.join(SESSION_FILE)).context("Failed to load session")
    }

    pub fn save_session(&self, data: &SessionData) -> Result<()> {
        write_json(&self.dir.join(SESSION_FILE), data).context("Failed to save session")
    }

    pub fn clear_session(&self) -> Result<()> {
        remove_if_exists(&self.dir.join(SESSION_FILE))
    }

    /// Load the pending-redirect marker, if any.
    pub fn load_pending(&self) -> Result<Option<PendingRedirect>> {
        read_json(&self.dir.join(PENDING_REDIRECT_FILE))
            .context("Failed to load pending redirect")
    }

    pub fn save_pending(&self, pending: &PendingRedirect) -> Result<()> {
        write_json(&self.dir.join(PENDING_REDIRECT_FILE), pending)
            .context("Failed to save pending redirect")
    }

    pub fn clear_pending(&self) -> Result<()> {
        remove_if_exists(&self.dir.join(PENDING_REDIRECT_FILE))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(value)?;
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}
