//! The session gate: decides whether a credential is available for a UI
//! action and how to obtain one.
//!
//! An interactive redirect hands control to the identity provider. The gate
//! persists a [`PendingRedirect`] marker first, and the next
//! [`SessionGate::initialize`] (after the browser comes back) finishes the
//! sign-in from that marker and reports what to resume.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use reqwest::Url;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use super::provider::{with_oidc_scopes, AuthorizationRequest, IdentityProvider, TokenGrant};
use super::{
    AccessToken, Account, AuthError, GateError, PendingRedirect, RedirectPurpose, SecretStore,
    SessionData, SessionStore,
};

/// Scope requested by an explicit login.
pub const LOGIN_SCOPE: &str = "User.Read";

/// Buffer size for the gate event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Performs the "full page navigation" to the provider's login page.
///
/// A browser build would set `window.location`; the terminal client shows
/// the URL and waits for the user to paste the callback.
pub trait Navigator: Send + Sync {
    fn navigate(&self, url: &Url);
}

/// Notifications for UI code that wants to react to sign-in changes.
#[derive(Debug, Clone, PartialEq)]
pub enum GateEvent {
    LoginSuccess(Account),
    LoginFailure(String),
    AcquireTokenFailure { scope: String, reason: String },
    RedirectStarted(RedirectPurpose),
}

/// What a completed redirect resumed.
#[derive(Debug, Clone, PartialEq)]
pub enum RedirectOutcome {
    LoggedIn(Account),
    TokenAcquired {
        account: Account,
        scope: String,
        app_state: Option<String>,
    },
}

#[derive(Default)]
struct GateState {
    ready: bool,
    active: Option<Account>,
    /// Access tokens by scope
    tokens: HashMap<String, AccessToken>,
}

pub struct SessionGate<P> {
    provider: P,
    store: SessionStore,
    secrets: Arc<dyn SecretStore>,
    navigator: Arc<dyn Navigator>,
    state: RwLock<GateState>,
    /// Set once a redirect has been handed to the navigator; cleared by
    /// `initialize`.
    redirect_started: AtomicBool,
    events: broadcast::Sender<GateEvent>,
}

impl<P: IdentityProvider> SessionGate<P> {
    pub fn new(
        provider: P,
        store: SessionStore,
        secrets: Arc<dyn SecretStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            provider,
            store,
            secrets,
            navigator,
            state: RwLock::new(GateState::default()),
            redirect_started: AtomicBool::new(false),
            events,
        }
    }

    /// Receive gate events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<GateEvent> {
        self.events.subscribe()
    }

    pub async fn is_ready(&self) -> bool {
        self.state.read().await.ready
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.active.is_some()
    }

    pub async fn active_account(&self) -> Option<Account> {
        self.state.read().await.active.clone()
    }

    /// Restore the persisted session and finish any redirect in flight.
    ///
    /// `callback` is the URL the provider redirected the browser back to.
    /// Redirect failures (denied consent, state mismatch, token endpoint
    /// errors) are logged and broadcast as [`GateEvent::LoginFailure`]; the
    /// gate still becomes ready. Only storage failures are returned, and
    /// they leave the gate not ready.
    pub async fn initialize(
        &self,
        callback: Option<&str>,
    ) -> Result<Option<RedirectOutcome>, GateError> {
        let restored = self.store.load_session().map_err(AuthError::storage)?;
        {
            let mut state = self.state.write().await;
            state.ready = false;
            state.tokens.clear();
            state.active = restored.map(|s| s.account);
            if let Some(ref account) = state.active {
                debug!(account = %account.home_account_id, "Restored session");
            }
        }
        self.redirect_started.store(false, Ordering::SeqCst);

        let outcome = match callback {
            Some(url) => match self.complete_redirect(url).await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    warn!(error = %e, "Failed to complete sign-in redirect");
                    self.emit(GateEvent::LoginFailure(e.to_string()));
                    None
                }
            },
            None => {
                self.discard_stale_redirect();
                None
            }
        };

        self.state.write().await.ready = true;
        Ok(outcome)
    }

    /// Start an interactive login.
    ///
    /// The account becomes active only once `initialize` processes the
    /// provider's callback. Fails with `RedirectStarted` if a redirect is
    /// already outstanding, leaving its marker in place.
    pub async fn login(&self) -> Result<(), GateError> {
        if !self.is_ready().await {
            return Err(GateError::NotReady);
        }
        if self.redirect_started.swap(true, Ordering::SeqCst) {
            return Err(GateError::RedirectStarted);
        }
        if let Err(e) = self.begin_redirect(RedirectPurpose::Login, None).await {
            self.redirect_started.store(false, Ordering::SeqCst);
            return Err(e.into());
        }
        Ok(())
    }

    /// Token for `scope`, obtained without prompting.
    pub async fn acquire_token(&self, scope: &str) -> Result<AccessToken, GateError> {
        self.acquire_token_with_state(scope, None).await
    }

    /// Like [`acquire_token`](Self::acquire_token), with an opaque
    /// `app_state` that is handed back in
    /// [`RedirectOutcome::TokenAcquired`] if the call falls back to a
    /// redirect.
    pub async fn acquire_token_with_state(
        &self,
        scope: &str,
        app_state: Option<&str>,
    ) -> Result<AccessToken, GateError> {
        let account = {
            let state = self.state.read().await;
            if !state.ready {
                return Err(GateError::NotReady);
            }
            let account = state.active.clone().ok_or(GateError::NoSession)?;
            if let Some(token) = state.tokens.get(scope).filter(|t| t.is_fresh()) {
                return Ok(token.clone());
            }
            account
        };

        if self.redirect_started.load(Ordering::SeqCst) {
            return Err(GateError::RedirectStarted);
        }

        match self.acquire_silent(&account, scope).await {
            Ok(token) => Ok(token),
            Err(e) if e.requires_interaction() => {
                debug!(scope, error = %e, "Silent acquisition needs interaction");
                if self.redirect_started.swap(true, Ordering::SeqCst) {
                    return Err(GateError::RedirectStarted);
                }
                let purpose = RedirectPurpose::AcquireToken {
                    scope: scope.to_string(),
                    app_state: app_state.map(str::to_string),
                };
                if let Err(e) = self
                    .begin_redirect(purpose, Some(&account.username))
                    .await
                {
                    self.redirect_started.store(false, Ordering::SeqCst);
                    return Err(e.into());
                }
                Err(GateError::RedirectStarted)
            }
            Err(e) => {
                warn!(scope, error = %e, "Silent token acquisition failed");
                self.emit(GateEvent::AcquireTokenFailure {
                    scope: scope.to_string(),
                    reason: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    /// Forget the active account, its refresh token and cached tokens.
    pub async fn clear(&self) -> Result<(), GateError> {
        let mut state = self.state.write().await;
        if let Some(account) = state.active.take() {
            self.secrets
                .delete(&account.home_account_id)
                .map_err(AuthError::storage)?;
            info!(account = %account.home_account_id, "Session cleared");
        }
        state.tokens.clear();
        self.store.clear_session().map_err(AuthError::storage)?;
        self.store.clear_pending().map_err(AuthError::storage)?;
        Ok(())
    }

    async fn acquire_silent(&self, account: &Account, scope: &str) -> Result<AccessToken, AuthError> {
        let refresh_token = self
            .secrets
            .get(&account.home_account_id)
            .map_err(AuthError::storage)?
            .ok_or(AuthError::NoRefreshToken)?;

        let scopes = with_oidc_scopes(&[scope.to_string()]);
        let grant = self.provider.refresh(&refresh_token, &scopes).await?;
        self.store_refresh_token(account, &grant)?;

        let token = AccessToken::new(grant.access_token, scope, grant.expires_at);
        let mut state = self.state.write().await;
        // The account may have been cleared or replaced during the refresh
        if state.active.as_ref() == Some(account) {
            state.tokens.insert(scope.to_string(), token.clone());
        }
        Ok(token)
    }

    /// Keep a rotated refresh token, if the grant carried one.
    fn store_refresh_token(&self, account: &Account, grant: &TokenGrant) -> Result<(), AuthError> {
        if let Some(ref refresh_token) = grant.refresh_token {
            self.secrets
                .store(&account.home_account_id, refresh_token)
                .map_err(AuthError::storage)?;
        }
        Ok(())
    }

    async fn begin_redirect(
        &self,
        purpose: RedirectPurpose,
        login_hint: Option<&str>,
    ) -> Result<(), AuthError> {
        let resource_scope = match &purpose {
            RedirectPurpose::Login => LOGIN_SCOPE.to_string(),
            RedirectPurpose::AcquireToken { scope, .. } => scope.clone(),
        };
        let scopes = with_oidc_scopes(&[resource_scope]);

        let redirect = self
            .provider
            .authorization_url(&AuthorizationRequest {
                scopes: &scopes,
                login_hint,
            })
            .await?;

        let pending = PendingRedirect {
            state: redirect.state,
            code_verifier: redirect.code_verifier,
            nonce: redirect.nonce,
            scopes,
            purpose: purpose.clone(),
            created_at: Utc::now(),
        };
        self.store.save_pending(&pending).map_err(AuthError::storage)?;

        info!(?purpose, "Redirecting to identity provider");
        self.emit(GateEvent::RedirectStarted(purpose));
        self.navigator.navigate(&redirect.url);
        Ok(())
    }

    async fn complete_redirect(&self, callback: &str) -> Result<RedirectOutcome, AuthError> {
        let url = Url::parse(callback)
            .map_err(|e| AuthError::InvalidUrl(format!("{}: {}", callback, e)))?;
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

        let pending = self
            .store
            .load_pending()
            .map_err(AuthError::storage)?
            .ok_or(AuthError::NoPendingRedirect)?;
        // The marker is single use, whatever the outcome
        self.store.clear_pending().map_err(AuthError::storage)?;

        if pending.is_expired() {
            return Err(AuthError::NoPendingRedirect);
        }
        if params.get("state") != Some(&pending.state) {
            return Err(AuthError::StateMismatch);
        }
        if let Some(error) = params.get("error") {
            return Err(AuthError::oauth(
                error.as_str(),
                params.get("error_description").map(String::as_str),
            ));
        }
        let code = params.get("code").ok_or(AuthError::MissingCode)?;

        let grant = self
            .provider
            .redeem_code(code, &pending.code_verifier, &pending.nonce, &pending.scopes)
            .await?;
        let account = grant
            .account
            .clone()
            .ok_or_else(|| AuthError::InvalidIdToken("token response has no id token".to_string()))?;

        let scope = match &pending.purpose {
            RedirectPurpose::Login => LOGIN_SCOPE.to_string(),
            RedirectPurpose::AcquireToken { scope, .. } => scope.clone(),
        };

        // Nothing changes in memory until the new session is on disk
        self.store_refresh_token(&account, &grant)?;
        self.store
            .save_session(&SessionData::new(account.clone()))
            .map_err(AuthError::storage)?;

        {
            let mut state = self.state.write().await;
            if state.active.as_ref() != Some(&account) {
                state.tokens.clear();
            }
            state.tokens.insert(
                scope.clone(),
                AccessToken::new(grant.access_token, &scope, grant.expires_at),
            );
            state.active = Some(account.clone());
        }
        info!(account = %account.home_account_id, "Signed in");
        self.emit(GateEvent::LoginSuccess(account.clone()));

        Ok(match pending.purpose {
            RedirectPurpose::Login => RedirectOutcome::LoggedIn(account),
            RedirectPurpose::AcquireToken { scope, app_state } => RedirectOutcome::TokenAcquired {
                account,
                scope,
                app_state,
            },
        })
    }

    fn discard_stale_redirect(&self) {
        match self.store.load_pending() {
            Ok(Some(pending)) if pending.is_expired() => {
                debug!("Discarding expired pending redirect");
                if let Err(e) = self.store.clear_pending() {
                    warn!(error = %e, "Failed to remove expired pending redirect");
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Unreadable pending redirect, discarding");
                let _ = self.store.clear_pending();
            }
        }
    }

    fn emit(&self, event: GateEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
