#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use reqwest::Url;
use tempfile::TempDir;
use tinyfront_core::auth::{
    Account, AuthError, AuthorizationRedirect, AuthorizationRequest, IdentityProvider,
    MemorySecretStore, Navigator, RedirectOutcome, SecretStore, SessionGate, SessionStore,
    TokenGrant,
};

pub const API_SCOPE: &str = "api://back-id/access_as_user";
pub const ACCOUNT_ID: &str = "oid-1.tid-1";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshBehavior {
    #[default]
    Succeed,
    InvalidGrant,
    ServerError,
}

type Hook = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct FakeState {
    nonce: Mutex<Option<String>>,
    subject: Mutex<Option<(String, String)>>,
    refresh_behavior: Mutex<RefreshBehavior>,
    before_redeem: Mutex<Option<Hook>>,
    authorize_calls: AtomicUsize,
    redeem_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
}

/// In-process identity provider that counts every token endpoint call.
#[derive(Clone, Default)]
pub struct FakeProvider {
    state: Arc<FakeState>,
}

impl FakeProvider {
    pub fn redeem_calls(&self) -> usize {
        self.state.redeem_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn network_calls(&self) -> usize {
        self.redeem_calls() + self.refresh_calls()
    }

    pub fn set_refresh_behavior(&self, behavior: RefreshBehavior) {
        *self.state.refresh_behavior.lock().unwrap() = behavior;
    }

    /// Sign the next code redemptions in as a different user.
    pub fn set_subject(&self, oid: &str, name: &str) {
        *self.state.subject.lock().unwrap() = Some((oid.to_string(), name.to_string()));
    }

    /// Run `hook` at the start of every code redemption.
    pub fn before_redeem(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.state.before_redeem.lock().unwrap() = Some(Box::new(hook));
    }

    fn account(&self) -> Account {
        let subject = self.state.subject.lock().unwrap().clone();
        let (oid, name) = subject.unwrap_or_else(|| ("oid-1".to_string(), "Ada Lovelace".to_string()));
        let username = format!(
            "{}@example.com",
            name.split_whitespace().next().unwrap_or_default().to_lowercase()
        );
        Account {
            home_account_id: format!("{}.tid-1", oid),
            tenant_id: "tid-1".to_string(),
            username,
            name: Some(name),
        }
    }
}

fn grant(n: usize, account: Option<Account>) -> TokenGrant {
    TokenGrant {
        access_token: format!("at-{}", n),
        expires_at: Utc::now() + Duration::hours(1),
        refresh_token: Some(format!("rt-{}", n)),
        account,
    }
}

impl IdentityProvider for FakeProvider {
    async fn authorization_url(
        &self,
        request: &AuthorizationRequest<'_>,
    ) -> Result<AuthorizationRedirect, AuthError> {
        let n = self.state.authorize_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let state = format!("state-{}", n);
        let nonce = format!("nonce-{}", n);
        *self.state.nonce.lock().unwrap() = Some(nonce.clone());

        let mut url = Url::parse("https://login.test/tenant/authorize").unwrap();
        url.query_pairs_mut()
            .append_pair("scope", &request.scopes.join(" "))
            .append_pair("state", &state)
            .append_pair("nonce", &nonce);
        if let Some(hint) = request.login_hint {
            url.query_pairs_mut().append_pair("login_hint", hint);
        }
        Ok(AuthorizationRedirect {
            url,
            state,
            nonce,
            code_verifier: format!("verifier-{}", n),
        })
    }

    async fn redeem_code(
        &self,
        _code: &str,
        _code_verifier: &str,
        nonce: &str,
        _scopes: &[String],
    ) -> Result<TokenGrant, AuthError> {
        let n = self.state.redeem_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(hook) = self.state.before_redeem.lock().unwrap().as_ref() {
            hook();
        }
        if self.state.nonce.lock().unwrap().as_deref() != Some(nonce) {
            return Err(AuthError::InvalidIdToken("nonce mismatch".to_string()));
        }
        Ok(grant(n, Some(self.account())))
    }

    async fn refresh(
        &self,
        _refresh_token: &str,
        _scopes: &[String],
    ) -> Result<TokenGrant, AuthError> {
        let n = self.state.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let behavior = *self.state.refresh_behavior.lock().unwrap();
        match behavior {
            RefreshBehavior::Succeed => Ok(grant(100 + n, None)),
            RefreshBehavior::InvalidGrant => Err(AuthError::oauth(
                "invalid_grant",
                Some("AADSTS700082: The refresh token has expired"),
            )),
            RefreshBehavior::ServerError => Err(AuthError::InvalidResponse(
                "Status 503 Service Unavailable: try later".to_string(),
            )),
        }
    }
}

/// Records every navigation instead of opening a browser.
#[derive(Default)]
pub struct RecordingNavigator {
    urls: Mutex<Vec<Url>>,
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, url: &Url) {
        self.urls.lock().unwrap().push(url.clone());
    }
}

impl RecordingNavigator {
    pub fn count(&self) -> usize {
        self.urls.lock().unwrap().len()
    }

    pub fn last_param(&self, name: &str) -> Option<String> {
        let urls = self.urls.lock().unwrap();
        let url = urls.last()?;
        url.query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}

pub struct Harness {
    pub gate: Arc<SessionGate<FakeProvider>>,
    pub provider: FakeProvider,
    pub navigator: Arc<RecordingNavigator>,
    pub secrets: Arc<MemorySecretStore>,
    pub dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(
            FakeProvider::default(),
            Arc::new(MemorySecretStore::new()),
            tempfile::tempdir().unwrap(),
        )
    }

    fn build(provider: FakeProvider, secrets: Arc<MemorySecretStore>, dir: TempDir) -> Self {
        let navigator = Arc::new(RecordingNavigator::default());
        let gate = SessionGate::new(
            provider.clone(),
            SessionStore::new(dir.path().to_path_buf()),
            secrets.clone(),
            navigator.clone(),
        );
        Self {
            gate: Arc::new(gate),
            provider,
            navigator,
            secrets,
            dir,
        }
    }

    /// A fresh gate over the same session directory and keychain, as after
    /// the process restarts.
    pub fn restart(self) -> Self {
        Self::build(self.provider, self.secrets, self.dir)
    }

    pub fn store(&self) -> SessionStore {
        SessionStore::new(self.dir.path().to_path_buf())
    }

    pub fn stored_refresh_token(&self) -> Option<String> {
        self.secrets.get(ACCOUNT_ID).unwrap()
    }

    /// Callback URL the provider would redirect to after a successful
    /// sign-in for the most recent navigation.
    pub fn success_callback(&self) -> String {
        let state = self.navigator.last_param("state").unwrap();
        format!("http://localhost:5173/?code=auth-code&state={}", state)
    }

    /// Same as [`success_callback`](Self::success_callback), with the state
    /// read back from the persisted marker.
    pub fn success_callback_from_store(&self) -> String {
        let pending = self.store().load_pending().unwrap().unwrap();
        format!("http://localhost:5173/?code=auth-code&state={}", pending.state)
    }

    /// Initialize, log in and complete the login redirect.
    pub async fn sign_in(&self) -> Account {
        self.gate.initialize(None).await.unwrap();
        self.gate.login().await.unwrap();
        let outcome = self
            .gate
            .initialize(Some(&self.success_callback()))
            .await
            .unwrap();
        match outcome {
            Some(RedirectOutcome::LoggedIn(account)) => account,
            other => panic!("expected login outcome, got {:?}", other),
        }
    }
}
