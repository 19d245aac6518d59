//! Core library for tinyfront.
//!
//! A small front end for an API protected by Microsoft Entra ID. The
//! [`auth::SessionGate`] owns the signed-in session and decides, per
//! action, whether a token can be obtained silently or the user must be
//! sent through an interactive redirect. [`api::GatedApi`] wraps the
//! backend calls so authenticated endpoints only go out with a token.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, Endpoint, GatedApi};
pub use auth::{
    AccessToken, Account, AuthError, CredentialStore, EntraProvider, GateError, GateEvent,
    IdentityProvider, Navigator, RedirectOutcome, SessionGate, SessionStore,
};
pub use config::Config;
pub use models::{HealthStatus, UserInfo};
pub use reqwest::Url;
