//! Seam between the session gate and a concrete OAuth2/OIDC provider.

use std::future::Future;

use chrono::{DateTime, Utc};
use reqwest::Url;

use super::{Account, AuthError};

/// Scopes added to every request so the provider returns an id token and a
/// refresh token.
pub const OIDC_SCOPES: &[&str] = &["openid", "profile", "offline_access"];

/// Parameters for an authorization (login page) request.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest<'a> {
    pub scopes: &'a [String],
    pub login_hint: Option<&'a str>,
}

/// A login page URL plus the one-time values the callback is checked
/// against. All three secrets must be persisted until the callback arrives.
#[derive(Debug, Clone)]
pub struct AuthorizationRedirect {
    pub url: Url,
    /// CSRF `state` echoed back in the callback
    pub state: String,
    /// Expected in the id token issued for this request
    pub nonce: String,
    /// PKCE verifier for the challenge embedded in `url`
    pub code_verifier: String,
}

/// Tokens returned by the provider's token endpoint.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub refresh_token: Option<String>,
    /// Account from a verified id token, when the response carried one
    pub account: Option<Account>,
}

/// Identity claims used to build an [`Account`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountClaims {
    pub oid: Option<String>,
    pub sub: Option<String>,
    pub tid: Option<String>,
    pub name: Option<String>,
    pub preferred_username: Option<String>,
}

impl AccountClaims {
    /// Build the account record for these claims.
    pub fn to_account(&self) -> Result<Account, AuthError> {
        let object_id = self
            .oid
            .as_deref()
            .or(self.sub.as_deref())
            .ok_or_else(|| AuthError::InvalidIdToken("missing oid and sub claims".to_string()))?;
        let tenant_id = self.tid.clone().unwrap_or_default();
        let home_account_id = if tenant_id.is_empty() {
            object_id.to_string()
        } else {
            format!("{}.{}", object_id, tenant_id)
        };

        Ok(Account {
            home_account_id,
            tenant_id,
            username: self.preferred_username.clone().unwrap_or_default(),
            name: self.name.clone(),
        })
    }
}

/// Requested scopes plus the OIDC scopes, without duplicates, order kept.
pub fn with_oidc_scopes(scopes: &[String]) -> Vec<String> {
    let mut all: Vec<String> = Vec::with_capacity(scopes.len() + OIDC_SCOPES.len());
    for scope in scopes.iter().map(String::as_str).chain(OIDC_SCOPES.iter().copied()) {
        if !all.iter().any(|s| s == scope) {
            all.push(scope.to_string());
        }
    }
    all
}

/// An OAuth2 authorization-code + refresh-token provider.
pub trait IdentityProvider: Send + Sync {
    /// Build the provider's interactive login page request, with fresh
    /// `state`, `nonce` and PKCE values.
    fn authorization_url(
        &self,
        request: &AuthorizationRequest<'_>,
    ) -> impl Future<Output = Result<AuthorizationRedirect, AuthError>> + Send;

    /// Redeem an authorization code from the redirect callback. The id token
    /// in the response must carry `nonce`.
    fn redeem_code(
        &self,
        code: &str,
        code_verifier: &str,
        nonce: &str,
        scopes: &[String],
    ) -> impl Future<Output = Result<TokenGrant, AuthError>> + Send;

    /// Obtain a new access token from a refresh token, without user
    /// interaction.
    fn refresh(
        &self,
        refresh_token: &str,
        scopes: &[String],
    ) -> impl Future<Output = Result<TokenGrant, AuthError>> + Send;
}
