//! Microsoft Entra ID (v2.0 endpoints) as a public OpenID Connect client.
//!
//! Endpoints and signing keys come from the tenant's discovery document,
//! fetched once on first use. Authorization uses the code flow with PKCE
//! and `response_mode=query`, so the redirect callback carries `code` and
//! `state` in the query string. Every id token is checked for signature,
//! issuer, audience and expiry before its claims become an [`Account`].

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use openidconnect::core::{
    CoreAuthDisplay, CoreAuthPrompt, CoreAuthenticationFlow, CoreErrorResponseType,
    CoreGenderClaim, CoreJsonWebKey, CoreJweContentEncryptionAlgorithm, CoreJwsSigningAlgorithm,
    CoreProviderMetadata, CoreRevocableToken, CoreRevocationErrorResponse,
    CoreTokenIntrospectionResponse, CoreTokenType,
};
use openidconnect::{
    AccessTokenHash, AdditionalClaims, AuthorizationCode, ClientId, CsrfToken,
    EmptyExtraTokenFields, EndpointMaybeSet, EndpointNotSet, EndpointSet, IdToken, IdTokenClaims,
    IdTokenFields, IdTokenVerifier, IssuerUrl, LoginHint, Nonce, NonceVerifier,
    OAuth2TokenResponse, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken,
    RequestTokenError, Scope, StandardErrorResponse, StandardTokenResponse, TokenResponse,
};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::api::error::truncate_body;
use crate::config::Config;

use super::provider::{
    AccountClaims, AuthorizationRedirect, AuthorizationRequest, IdentityProvider, TokenGrant,
};
use super::{Account, AuthError};

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Used when the token response omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Always present in the authorization request; not added a second time.
const OPENID_SCOPE: &str = "openid";

/// Entra-specific id token claims.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntraClaims {
    /// Object id of the user in the tenant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tid: Option<String>,
}

impl AdditionalClaims for EntraClaims {}

pub type EntraIdTokenClaims = IdTokenClaims<EntraClaims, CoreGenderClaim>;

pub type EntraIdToken =
    IdToken<EntraClaims, CoreGenderClaim, CoreJweContentEncryptionAlgorithm, CoreJwsSigningAlgorithm>;

type EntraIdTokenFields = IdTokenFields<
    EntraClaims,
    EmptyExtraTokenFields,
    CoreGenderClaim,
    CoreJweContentEncryptionAlgorithm,
    CoreJwsSigningAlgorithm,
>;

type EntraTokenResponse = StandardTokenResponse<EntraIdTokenFields, CoreTokenType>;

type EntraClient = openidconnect::Client<
    EntraClaims,
    CoreAuthDisplay,
    CoreGenderClaim,
    CoreJweContentEncryptionAlgorithm,
    CoreJsonWebKey,
    CoreAuthPrompt,
    StandardErrorResponse<CoreErrorResponseType>,
    EntraTokenResponse,
    CoreTokenIntrospectionResponse,
    CoreRevocableToken,
    CoreRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointMaybeSet,
    EndpointMaybeSet,
>;

/// Accepts any nonce. Refreshed id tokens do not carry the original one.
struct AnyNonce;

impl NonceVerifier for AnyNonce {
    fn verify(self, _nonce: Option<&Nonce>) -> Result<(), String> {
        Ok(())
    }
}

/// Entra ID client for one tenant and app registration.
pub struct EntraProvider {
    http: openidconnect::reqwest::Client,
    client_id: ClientId,
    issuer: IssuerUrl,
    redirect_uri: RedirectUrl,
    /// Built from the discovery document on first use
    client: OnceCell<EntraClient>,
}

impl EntraProvider {
    /// Provider for the configured tenant and frontend app registration.
    pub fn new(config: &Config) -> Result<Self, AuthError> {
        Self::with_issuer(
            &config.frontend_client_id,
            &config.issuer(),
            config.redirect_uri(),
        )
    }

    /// Provider for an explicit issuer. No request is made until the first
    /// sign-in or refresh.
    pub fn with_issuer(
        client_id: &str,
        issuer: &str,
        redirect_uri: &str,
    ) -> Result<Self, AuthError> {
        let http = openidconnect::reqwest::ClientBuilder::new()
            .timeout(StdDuration::from_secs(REQUEST_TIMEOUT_SECS))
            // Token endpoints never legitimately redirect
            .redirect(openidconnect::reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let issuer = IssuerUrl::new(issuer.to_string())
            .map_err(|e| AuthError::InvalidUrl(format!("{}: {}", issuer, e)))?;
        let redirect_uri = RedirectUrl::new(redirect_uri.to_string())
            .map_err(|e| AuthError::InvalidUrl(format!("{}: {}", redirect_uri, e)))?;

        Ok(Self {
            http,
            client_id: ClientId::new(client_id.to_string()),
            issuer,
            redirect_uri,
            client: OnceCell::new(),
        })
    }

    pub fn issuer(&self) -> &str {
        self.issuer.as_str()
    }

    async fn client(&self) -> Result<&EntraClient, AuthError> {
        self.client
            .get_or_try_init(|| async {
                let metadata = CoreProviderMetadata::discover_async(self.issuer.clone(), &self.http)
                    .await
                    .map_err(|e| AuthError::Discovery(error_chain(&e)))?;
                debug!(issuer = self.issuer(), "Discovered OpenID provider");
                let client =
                    EntraClient::from_provider_metadata(metadata, self.client_id.clone(), None)
                        .set_redirect_uri(self.redirect_uri.clone());
                Ok::<_, AuthError>(client)
            })
            .await
    }
}

impl IdentityProvider for EntraProvider {
    async fn authorization_url(
        &self,
        request: &AuthorizationRequest<'_>,
    ) -> Result<AuthorizationRedirect, AuthError> {
        let client = self.client().await?;
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();

        let mut authorize = client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                CsrfToken::new_random,
                Nonce::new_random,
            )
            .set_pkce_challenge(challenge)
            .add_extra_param("response_mode", "query");
        for scope in request.scopes.iter().filter(|s| s.as_str() != OPENID_SCOPE) {
            authorize = authorize.add_scope(Scope::new(scope.clone()));
        }
        if let Some(hint) = request.login_hint {
            authorize = authorize.set_login_hint(LoginHint::new(hint.to_string()));
        }

        let (url, state, nonce) = authorize.url();
        Ok(AuthorizationRedirect {
            url,
            state: state.into_secret(),
            nonce: nonce.secret().to_owned(),
            code_verifier: verifier.into_secret(),
        })
    }

    async fn redeem_code(
        &self,
        code: &str,
        code_verifier: &str,
        nonce: &str,
        scopes: &[String],
    ) -> Result<TokenGrant, AuthError> {
        let client = self.client().await?;
        let response = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(|e| AuthError::Discovery(e.to_string()))?
            .set_pkce_verifier(PkceCodeVerifier::new(code_verifier.to_string()))
            .add_extra_param("scope", scopes.join(" "))
            .request_async(&self.http)
            .await
            .map_err(token_error)?;

        let nonce = Nonce::new(nonce.to_string());
        grant_from_response(client, &response, &nonce)
    }

    async fn refresh(&self, refresh_token: &str, scopes: &[String]) -> Result<TokenGrant, AuthError> {
        let client = self.client().await?;
        let refresh_token = RefreshToken::new(refresh_token.to_string());
        let response = client
            .exchange_refresh_token(&refresh_token)
            .map_err(|e| AuthError::Discovery(e.to_string()))?
            .add_scopes(scopes.iter().map(|s| Scope::new(s.clone())))
            .request_async(&self.http)
            .await
            .map_err(token_error)?;

        grant_from_response(client, &response, AnyNonce)
    }
}

fn grant_from_response<N: NonceVerifier>(
    client: &EntraClient,
    response: &EntraTokenResponse,
    nonce: N,
) -> Result<TokenGrant, AuthError> {
    let account = match response.id_token() {
        Some(id_token) => Some(verify_id_token(client, id_token, response, nonce)?),
        None => None,
    };
    let expires_at = expiry(response.expires_in())?;

    debug!(
        %expires_at,
        has_refresh_token = response.refresh_token().is_some(),
        has_id_token = account.is_some(),
        "Token response received"
    );

    Ok(TokenGrant {
        access_token: response.access_token().secret().to_owned(),
        expires_at,
        refresh_token: response.refresh_token().map(|t| t.secret().to_owned()),
        account,
    })
}

fn verify_id_token<N: NonceVerifier>(
    client: &EntraClient,
    id_token: &EntraIdToken,
    response: &EntraTokenResponse,
    nonce: N,
) -> Result<Account, AuthError> {
    let verifier: IdTokenVerifier<'_, CoreJsonWebKey> = client.id_token_verifier();
    let claims = id_token
        .claims(&verifier, nonce)
        .map_err(invalid_id_token)?;

    if let Some(expected) = claims.access_token_hash() {
        let actual = AccessTokenHash::from_token(
            response.access_token(),
            id_token.signing_alg().map_err(invalid_id_token)?,
            id_token.signing_key(&verifier).map_err(invalid_id_token)?,
        )
        .map_err(invalid_id_token)?;
        if actual != *expected {
            return Err(AuthError::InvalidIdToken(
                "access token hash mismatch".to_string(),
            ));
        }
    }

    account_from_claims(claims)
}

/// Map verified id token claims onto an [`Account`]. `oid` is preferred
/// over `sub`, which is pairwise per application.
pub fn account_from_claims(claims: &EntraIdTokenClaims) -> Result<Account, AuthError> {
    let extra = claims.additional_claims();
    AccountClaims {
        oid: extra.oid.clone(),
        sub: Some(claims.subject().as_str().to_string()),
        tid: extra.tid.clone(),
        name: claims
            .name()
            .and_then(|name| name.get(None))
            .map(|name| name.as_str().to_string()),
        preferred_username: claims
            .preferred_username()
            .map(|username| username.as_str().to_string()),
    }
    .to_account()
}

/// Absolute expiry for a token lifetime reported by the token endpoint.
fn expiry(expires_in: Option<StdDuration>) -> Result<DateTime<Utc>, AuthError> {
    let lifetime = match expires_in {
        Some(lifetime) => Duration::from_std(lifetime).map_err(|_| {
            AuthError::InvalidResponse(format!(
                "expires_in of {} seconds is out of range",
                lifetime.as_secs()
            ))
        })?,
        None => Duration::seconds(DEFAULT_EXPIRES_IN_SECS),
    };
    Utc::now().checked_add_signed(lifetime).ok_or_else(|| {
        AuthError::InvalidResponse(format!(
            "expires_in of {} seconds is out of range",
            lifetime.num_seconds()
        ))
    })
}

fn token_error<RE>(err: RequestTokenError<RE, StandardErrorResponse<CoreErrorResponseType>>) -> AuthError
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => {
            let code: &str = response.error().as_ref();
            AuthError::oauth(code, response.error_description().map(String::as_str))
        }
        RequestTokenError::Request(e) => AuthError::Network(error_chain(&e)),
        RequestTokenError::Parse(e, body) => AuthError::InvalidResponse(format!(
            "Failed to parse token response ({}): {}",
            e,
            truncate_body(&String::from_utf8_lossy(&body))
        )),
        RequestTokenError::Other(msg) => AuthError::InvalidResponse(msg),
    }
}

fn invalid_id_token(err: impl std::fmt::Display) -> AuthError {
    AuthError::InvalidIdToken(err.to_string())
}

/// `err` and its sources, joined with ": ".
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
