//! Authentication: the session gate and everything behind it.
//!
//! This module provides:
//! - `SessionGate`: the single source of truth for "is someone signed in"
//!   and "give me a token for this scope"
//! - `IdentityProvider`: the OAuth2/OIDC seam, with `EntraProvider` as the
//!   production implementation
//! - `SessionStore`: the persisted account and pending-redirect marker
//! - `SecretStore`: refresh-token storage (OS keychain or in-memory)
//!
//! Access tokens live only in memory and are refreshed 5 minutes before
//! they expire.

pub mod credentials;
pub mod entra;
pub mod error;
pub mod gate;
pub mod provider;
pub mod session;
pub mod token;

pub use credentials::{CredentialStore, MemorySecretStore, SecretStore};
pub use entra::{EntraClaims, EntraIdToken, EntraIdTokenClaims, EntraProvider};
pub use error::{AuthError, GateError};
pub use gate::{GateEvent, Navigator, RedirectOutcome, SessionGate, LOGIN_SCOPE};
pub use provider::{
    AccountClaims, AuthorizationRedirect, AuthorizationRequest, IdentityProvider, TokenGrant,
};
pub use session::{Account, PendingRedirect, RedirectPurpose, SessionData, SessionStore};
pub use token::AccessToken;
