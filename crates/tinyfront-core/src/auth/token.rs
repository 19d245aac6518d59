use std::fmt;

use chrono::{DateTime, Duration, Utc};

/// Cached tokens are replaced this long before the provider's expiry.
const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

/// Bearer token for a single scope.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    secret: String,
    scope: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(secret: String, scope: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            secret,
            scope: scope.into(),
            expires_at,
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Still usable without a refresh.
    pub fn is_fresh(&self) -> bool {
        Utc::now() + Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES) < self.expires_at
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}
