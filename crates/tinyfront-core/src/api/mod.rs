//! Backend API access.
//!
//! - `client`: plain HTTP calls against the backend
//! - `gated`: the same calls, with tokens obtained through the session gate

pub mod client;
pub mod error;
pub mod gated;

pub use client::ApiClient;
pub use error::ApiError;
pub use gated::{is_redirect_started, Endpoint, GatedApi};
