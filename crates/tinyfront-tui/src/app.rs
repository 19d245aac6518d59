//! Application state management for tinyfront.
//!
//! The `App` owns the session gate and the gated API client. Backend calls run
//! as spawned tokio tasks and report back over an mpsc channel that the main
//! loop drains every frame. When the gate hands a login URL to the
//! [`TerminalNavigator`], the app switches to the redirect overlay and waits
//! for the user to paste the URL the browser was sent back to.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use tinyfront_core::api::{is_redirect_started, ApiClient, Endpoint, GatedApi};
use tinyfront_core::auth::{
    Account, CredentialStore, EntraProvider, GateEvent, Navigator, RedirectOutcome, SecretStore,
    SessionGate, SessionStore,
};
use tinyfront_core::{Config, Url};

// ============================================================================
// Constants
// ============================================================================

/// Buffer size for the request result channel.
const CHANNEL_BUFFER_SIZE: usize = 32;

/// Maximum length for the pasted callback URL.
/// Callback URLs carry an authorization code and session state; 4096 leaves
/// plenty of room.
const MAX_CALLBACK_LENGTH: usize = 4096;

/// Output pane text before any action has run.
pub const INITIAL_OUTPUT: &str = "Click a button to get started.";

// ============================================================================
// UI State Types
// ============================================================================

/// Overall application state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Normal,
    /// The login page URL is shown and the callback URL is being entered.
    AwaitingRedirect,
    ShowingHelp,
    ConfirmingQuit,
    Quitting,
}

/// Output pane text when a backend call fails.
pub fn failure_message(endpoint: Endpoint) -> &'static str {
    match endpoint {
        Endpoint::Health => "Failed to fetch API health check",
        Endpoint::User => "Failed to fetch user info",
        Endpoint::Admin => "Failed to fetch admin info",
    }
}

// ============================================================================
// Navigation
// ============================================================================

/// Navigator for a terminal: keeps the most recent login URL until the UI
/// picks it up and shows it.
#[derive(Default)]
pub struct TerminalNavigator {
    pending: Mutex<Option<Url>>,
}

impl Navigator for TerminalNavigator {
    fn navigate(&self, url: &Url) {
        match self.pending.lock() {
            Ok(mut pending) => *pending = Some(url.clone()),
            Err(_) => error!("Navigator lock poisoned, dropping login URL"),
        }
    }
}

impl TerminalNavigator {
    /// Take the pending login URL, if any.
    pub fn take(&self) -> Option<Url> {
        self.pending.lock().ok().and_then(|mut pending| pending.take())
    }
}

// ============================================================================
// Background Request Results
// ============================================================================

enum FetchOutcome {
    /// Display text for the output pane
    Done(String),
    Failed,
    /// The gate started an interactive sign-in instead of returning a token
    Redirecting,
}

/// Result of a spawned backend call.
struct RequestResult {
    /// Value of `App::generation` when the request was spawned
    generation: u64,
    endpoint: Endpoint,
    outcome: FetchOutcome,
}

// ============================================================================
// App
// ============================================================================

pub struct App {
    gate: Arc<SessionGate<EntraProvider>>,
    api: GatedApi<EntraProvider>,
    navigator: Arc<TerminalNavigator>,
    events: broadcast::Receiver<GateEvent>,

    pub state: AppState,
    /// Signed-in account, mirrored from the gate for rendering
    pub account: Option<Account>,
    pub output: String,
    pub output_failed: bool,
    pub status_message: Option<String>,

    /// Login page URL shown in the redirect overlay
    pub auth_url: Option<String>,
    pub callback_input: String,

    /// Bumped on every redirect; results from older generations are dropped.
    generation: u64,
    request_rx: mpsc::Receiver<RequestResult>,
    request_tx: mpsc::Sender<RequestResult>,
}

impl App {
    /// Create a new application instance
    pub fn new(config: Config) -> Result<Self> {
        let provider = EntraProvider::new(&config)?;
        let session_dir = config.session_dir()?;
        debug!(?session_dir, "Session directory configured");

        Self::with_parts(
            provider,
            SessionStore::new(session_dir),
            Arc::new(CredentialStore),
            &config.api_base_url,
            config.api_scope(),
        )
    }

    /// Application over explicit storage, for callers that do not use the
    /// OS keychain or the default session directory.
    pub fn with_parts(
        provider: EntraProvider,
        store: SessionStore,
        secrets: Arc<dyn SecretStore>,
        api_base_url: &str,
        api_scope: String,
    ) -> Result<Self> {
        let navigator = Arc::new(TerminalNavigator::default());
        let gate = Arc::new(SessionGate::new(
            provider,
            store,
            secrets,
            navigator.clone(),
        ));
        let events = gate.subscribe();

        let client = ApiClient::new(api_base_url)?;
        let api = GatedApi::new(gate.clone(), client, api_scope);

        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);

        Ok(Self {
            gate,
            api,
            navigator,
            events,

            state: AppState::Normal,
            account: None,
            output: INITIAL_OUTPUT.to_string(),
            output_failed: false,
            status_message: None,

            auth_url: None,
            callback_input: String::new(),

            generation: 0,
            request_rx: rx,
            request_tx: tx,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.account.is_some()
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Initialize the session gate, finishing a redirect if `callback` is the
    /// URL the provider sent the browser back to, and resume whatever the
    /// redirect interrupted.
    pub async fn initialize(&mut self, callback: Option<&str>) {
        let outcome = match self.gate.initialize(callback).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Failed to initialize session gate");
                return;
            }
        };
        self.account = self.gate.active_account().await;
        info!(authenticated = self.account.is_some(), "Session gate ready");

        if let Some(outcome) = outcome {
            self.resume(outcome);
        }
    }

    /// Pick up where a completed redirect left off.
    fn resume(&mut self, outcome: RedirectOutcome) {
        match outcome {
            RedirectOutcome::LoggedIn(account) => {
                self.status_message = Some(format!("Signed in as {}", account.username));
            }
            RedirectOutcome::TokenAcquired { app_state, .. } => {
                match app_state.as_deref().and_then(Endpoint::from_app_state) {
                    Some(endpoint) => {
                        debug!(endpoint = endpoint.path(), "Resuming request after sign-in");
                        self.fetch(endpoint);
                    }
                    None => warn!(?app_state, "Unknown app state after sign-in"),
                }
            }
        }
    }

    /// Start an interactive login.
    pub async fn login(&mut self) {
        if let Some(ref account) = self.account {
            self.status_message = Some(format!("Already signed in as {}", account.username));
            return;
        }
        if let Err(e) = self.gate.login().await {
            warn!(error = %e, "Login could not start");
            self.status_message = Some(format!("Login unavailable: {}", e));
        }
    }

    /// Forget the signed-in account.
    pub async fn clear_session(&mut self) {
        match self.gate.clear().await {
            Ok(()) => {
                self.account = None;
                self.output = INITIAL_OUTPUT.to_string();
                self.output_failed = false;
                self.status_message = Some("Session cleared".to_string());
            }
            Err(e) => {
                warn!(error = %e, "Failed to clear session");
                self.status_message = Some(format!("Failed to clear session: {}", e));
            }
        }
    }

    // =========================================================================
    // Redirect overlay
    // =========================================================================

    fn enter_redirect(&mut self, url: Url) {
        self.generation += 1;
        self.auth_url = Some(url.to_string());
        self.callback_input.clear();
        self.status_message = None;
        self.state = AppState::AwaitingRedirect;
    }

    /// "Reload" with the pasted callback URL.
    pub async fn submit_callback(&mut self) {
        let callback = self.callback_input.trim().to_string();
        if callback.is_empty() {
            return;
        }
        self.leave_redirect();
        self.initialize(Some(&callback)).await;
    }

    /// Give up on the sign-in and reload without a callback.
    pub async fn cancel_redirect(&mut self) {
        self.leave_redirect();
        self.initialize(None).await;
        self.status_message = Some("Sign-in cancelled".to_string());
    }

    fn leave_redirect(&mut self) {
        self.auth_url = None;
        self.callback_input.clear();
        self.state = AppState::Normal;
    }

    pub fn push_callback_char(&mut self, c: char) {
        if can_add_callback_char(self.callback_input.len(), c) {
            self.callback_input.push(c);
        }
    }

    // =========================================================================
    // Backend calls
    // =========================================================================

    /// Call `endpoint` in the background.
    pub fn fetch(&mut self, endpoint: Endpoint) {
        if endpoint.requires_token() && !self.is_authenticated() {
            self.status_message = Some(format!("Log in to call {}", endpoint.path()));
            return;
        }

        let api = self.api.clone();
        let tx = self.request_tx.clone();
        let generation = self.generation;
        self.status_message = Some(format!("Fetching {}...", endpoint.path()));

        tokio::spawn(async move {
            let outcome = match api.fetch_display(endpoint).await {
                Ok(text) => FetchOutcome::Done(text),
                Err(e) if is_redirect_started(&e) => FetchOutcome::Redirecting,
                Err(e) => {
                    warn!(endpoint = endpoint.path(), error = %format!("{:#}", e), "Request failed");
                    FetchOutcome::Failed
                }
            };
            let result = RequestResult {
                generation,
                endpoint,
                outcome,
            };
            if tx.send(result).await.is_err() {
                debug!("Request result channel closed");
            }
        });
    }

    /// Check for completed background work and gate activity
    pub fn check_background_tasks(&mut self) {
        while let Ok(result) = self.request_rx.try_recv() {
            self.process_request_result(result);
        }

        loop {
            match self.events.try_recv() {
                Ok(event) => self.process_gate_event(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed gate events");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }

        if let Some(url) = self.navigator.take() {
            self.enter_redirect(url);
        }
    }

    fn process_request_result(&mut self, result: RequestResult) {
        if result.generation != self.generation {
            debug!(endpoint = result.endpoint.path(), "Dropping result from before redirect");
            return;
        }
        match result.outcome {
            FetchOutcome::Done(text) => {
                self.output = text;
                self.output_failed = false;
                self.status_message = None;
            }
            FetchOutcome::Failed => {
                self.output = failure_message(result.endpoint).to_string();
                self.output_failed = true;
                self.status_message = None;
            }
            FetchOutcome::Redirecting => {
                self.status_message = Some("Sign-in required".to_string());
            }
        }
    }

    fn process_gate_event(&mut self, event: GateEvent) {
        match event {
            GateEvent::LoginSuccess(account) => {
                self.account = Some(account);
            }
            GateEvent::LoginFailure(reason) => {
                self.status_message = Some(format!("Login failed: {}", reason));
            }
            GateEvent::AcquireTokenFailure { scope, reason } => {
                debug!(%scope, %reason, "Token acquisition failed");
            }
            GateEvent::RedirectStarted(purpose) => {
                debug!(?purpose, "Redirect started");
            }
        }
    }
}

// ============================================================================
// Input validation helpers (exported for use in input.rs)
// ============================================================================

/// Check if a character is valid for input (no control characters)
fn is_valid_input_char(c: char) -> bool {
    !c.is_control()
}

/// Check if a callback URL character should be accepted
pub fn can_add_callback_char(current_len: usize, c: char) -> bool {
    current_len < MAX_CALLBACK_LENGTH && is_valid_input_char(c)
}

// ============================================================================
// Tests
// ============================================================================
