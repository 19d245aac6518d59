//! Backend calls routed through the session gate.
//!
//! Authenticated endpoints never see the network unless the gate hands
//! over a token. When the gate falls back to a redirect the call returns
//! [`GateError::RedirectStarted`] and the endpoint name rides along as
//! `app_state`, so the caller can repeat it after the redirect completes.

use std::sync::Arc;

use anyhow::Result;

use crate::auth::{GateError, IdentityProvider, SessionGate};
use crate::models::{HealthStatus, UserInfo};

use super::ApiClient;

/// A backend endpoint the frontend can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Health,
    User,
    Admin,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Health => "/",
            Endpoint::User => "/user",
            Endpoint::Admin => "/admin",
        }
    }

    pub fn requires_token(&self) -> bool {
        !matches!(self, Endpoint::Health)
    }

    /// Value carried through a redirect as `app_state`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Health => "health",
            Endpoint::User => "user",
            Endpoint::Admin => "admin",
        }
    }

    pub fn from_app_state(value: &str) -> Option<Self> {
        match value {
            "health" => Some(Endpoint::Health),
            "user" => Some(Endpoint::User),
            "admin" => Some(Endpoint::Admin),
            _ => None,
        }
    }
}

/// True when `err` means the gate has navigated away to the provider.
pub fn is_redirect_started(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<GateError>(),
        Some(GateError::RedirectStarted)
    )
}

pub struct GatedApi<P> {
    gate: Arc<SessionGate<P>>,
    client: ApiClient,
    scope: String,
}

impl<P> Clone for GatedApi<P> {
    fn clone(&self) -> Self {
        Self {
            gate: Arc::clone(&self.gate),
            client: self.client.clone(),
            scope: self.scope.clone(),
        }
    }
}

impl<P: IdentityProvider> GatedApi<P> {
    /// `scope` is the backend API scope requested for `/user` and `/admin`.
    pub fn new(gate: Arc<SessionGate<P>>, client: ApiClient, scope: impl Into<String>) -> Self {
        Self {
            gate,
            client,
            scope: scope.into(),
        }
    }

    pub fn gate(&self) -> &Arc<SessionGate<P>> {
        &self.gate
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub async fn health(&self) -> Result<HealthStatus> {
        self.client.health().await
    }

    pub async fn user_info(&self) -> Result<UserInfo> {
        let token = self
            .gate
            .acquire_token_with_state(&self.scope, Some(Endpoint::User.as_str()))
            .await?;
        self.client.user_info(&token).await
    }

    pub async fn admin_info(&self) -> Result<UserInfo> {
        let token = self
            .gate
            .acquire_token_with_state(&self.scope, Some(Endpoint::Admin.as_str()))
            .await?;
        self.client.admin_info(&token).await
    }

    /// Call `endpoint` and render the result as display text.
    pub async fn fetch_display(&self, endpoint: Endpoint) -> Result<String> {
        Ok(match endpoint {
            Endpoint::Health => self.health().await?.display(),
            Endpoint::User => self.user_info().await?.display(),
            Endpoint::Admin => self.admin_info().await?.display(),
        })
    }
}
