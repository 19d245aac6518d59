//! Data models for backend responses.
//!
//! - `HealthStatus`: `GET /`
//! - `UserInfo`: the `user` object of `GET /user` and `GET /admin`

pub mod health;
pub mod user;

pub use health::HealthStatus;
pub use user::{EmailField, UserEnvelope, UserInfo};
