use thiserror::Error;

/// OAuth error codes that mean the cached credential can no longer be used
/// silently and the user has to go through the provider's login page.
const INTERACTION_REQUIRED_CODES: &[&str] = &[
    "invalid_grant",
    "interaction_required",
    "login_required",
    "consent_required",
];

/// Errors raised while talking to the identity provider or handling its
/// redirects.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Identity provider returned {code}: {description}")]
    Oauth { code: String, description: String },

    #[error("Network error talking to identity provider: {0}")]
    Network(String),

    #[error("OpenID provider discovery failed: {0}")]
    Discovery(String),

    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    #[error("Invalid id token: {0}")]
    InvalidIdToken(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Redirect state does not match the pending sign-in request")]
    StateMismatch,

    #[error("Redirect callback is missing the authorization code")]
    MissingCode,

    #[error("No pending sign-in request to complete")]
    NoPendingRedirect,

    #[error("No refresh token cached for this account")]
    NoRefreshToken,

    #[error("Session storage error: {0}")]
    Storage(String),
}

impl AuthError {
    pub fn oauth(code: impl Into<String>, description: Option<&str>) -> Self {
        AuthError::Oauth {
            code: code.into(),
            description: description.unwrap_or("no description").to_string(),
        }
    }

    /// Wrap an `anyhow` storage failure, keeping its context chain.
    pub fn storage(err: anyhow::Error) -> Self {
        AuthError::Storage(format!("{:#}", err))
    }

    /// Whether this failure should be answered with an interactive redirect
    /// rather than reported to the caller.
    pub fn requires_interaction(&self) -> bool {
        match self {
            AuthError::NoRefreshToken => true,
            AuthError::Oauth { code, .. } => INTERACTION_REQUIRED_CODES.contains(&code.as_str()),
            _ => false,
        }
    }
}

/// Why the session gate could not hand out a token.
///
/// Every variant means "no token available now"; callers show their own
/// failure text and do not retry.
#[derive(Error, Debug)]
pub enum GateError {
    #[error("Session gate has not finished initializing")]
    NotReady,

    #[error("No signed-in account")]
    NoSession,

    #[error("Interactive sign-in started; no token until it completes")]
    RedirectStarted,

    #[error(transparent)]
    Provider(#[from] AuthError),
}
