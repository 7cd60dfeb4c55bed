//! Bearer-token authentication.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use domain::Principal;

use crate::AppState;
use crate::config::TokenGrant;
use crate::error::ApiError;

/// Resolves a bearer token to the caller it identifies.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, token: &str) -> Option<Principal>;
}

/// Fixed token table loaded from configuration.
#[derive(Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, Principal>,
}

impl StaticTokenAuthenticator {
    pub fn new(grants: &[TokenGrant]) -> Self {
        let tokens = grants
            .iter()
            .map(|grant| (grant.token.reveal().clone(), grant.principal))
            .collect();
        Self { tokens }
    }

    pub fn with_token(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.tokens.insert(token.into(), principal);
        self
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Authenticator for StaticTokenAuthenticator {
    fn authenticate(&self, token: &str) -> Option<Principal> {
        self.tokens.get(token).copied()
    }
}

/// Extracts the authenticated caller from `Authorization: Bearer <token>`.
#[derive(Debug, Clone, Copy)]
pub struct Authenticated(pub Principal);

impl FromRequestParts<Arc<AppState>> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                metrics::counter!("auth_rejections_total", "reason" => "missing").increment(1);
                ApiError::Unauthorized("missing bearer token".to_string())
            })?;
        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("expected a bearer token".to_string()))?;

        state
            .authenticator
            .authenticate(token)
            .map(Authenticated)
            .ok_or_else(|| {
                tracing::debug!("unknown bearer token");
                metrics::counter!("auth_rejections_total", "reason" => "unknown_token")
                    .increment(1);
                ApiError::Unauthorized("invalid bearer token".to_string())
            })
    }
}
