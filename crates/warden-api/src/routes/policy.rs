//! # Compliance Policy Endpoints
//!
//! Read and replace the active policy. Replacement is atomic: the new
//! policy applies to the next report evaluation; in-flight evaluations keep
//! the snapshot they loaded. An invalid `enforcement_mode` literal is
//! rejected at deserialization.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use warden_core::CompliancePolicy;

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/v1/fleet/policy", get(get_policy).put(put_policy))
}

/// GET /api/v1/fleet/policy — the active policy.
async fn get_policy(State(state): State<AppState>) -> Json<CompliancePolicy> {
    Json(*state.policy.current())
}

/// PUT /api/v1/fleet/policy — install a replacement policy.
async fn put_policy(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Json(policy): Json<CompliancePolicy>,
) -> Result<Json<CompliancePolicy>, ApiError> {
    state.policy.replace(policy);
    Ok(Json(policy))
}
