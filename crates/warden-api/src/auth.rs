//! # Authentication Extractors
//!
//! Two bearer-token principals:
//!
//! - [`AdminAuth`]: the configured admin key, compared in constant time.
//!   When no admin key is configured the controller is in development mode
//!   and admin endpoints are open.
//! - [`AuthedNode`]: a node API key, resolved to exactly one node through
//!   the store's hash lookup.
//!
//! Extractors (rather than blanket middleware) because most node routes
//! need the resolved [`Node`] value, not just a gate.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use subtle::ConstantTimeEq;

use warden_core::{FleetError, Node};
use warden_store::secret::hash_secret;

use crate::error::ApiError;
use crate::state::AppState;

/// Pull the bearer credential out of the `Authorization` header.
fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(ApiError(FleetError::InvalidCredentials))
}

/// Proof that the caller holds the admin key (or that none is configured).
#[derive(Debug, Clone, Copy)]
pub struct AdminAuth;

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(admin_key) = state.config.admin_key.as_deref() else {
            // Development mode: no key configured, admin surface open.
            return Ok(AdminAuth);
        };

        let presented = bearer_token(parts)?;
        // Compare hashes so the comparison is fixed-width regardless of
        // what the caller sent.
        let presented_hash = hash_secret(presented);
        let expected_hash = hash_secret(admin_key);
        if presented_hash
            .as_bytes()
            .ct_eq(expected_hash.as_bytes())
            .into()
        {
            Ok(AdminAuth)
        } else {
            Err(ApiError(FleetError::InvalidCredentials))
        }
    }
}

/// The node resolved from the caller's API key.
#[derive(Debug, Clone)]
pub struct AuthedNode(pub Node);

impl FromRequestParts<AppState> for AuthedNode {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let presented = bearer_token(parts)?;
        let node = state
            .store
            .node_by_api_key_hash(&hash_secret(presented))
            .await?
            .ok_or(FleetError::InvalidCredentials)?;
        Ok(AuthedNode(node))
    }
}
