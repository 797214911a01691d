//! # Enrollment
//!
//! Token-authenticated creation of new fleet nodes. The response carries
//! the node's plaintext API key exactly once; the agent is expected to
//! stash it in local secure storage because the controller cannot recover
//! it.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use warden_core::{FleetError, FleetEvent, FleetEventKind, NodeRole, ServiceRegistration};
use warden_store::NewNode;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    /// Enrollment token secret.
    pub token: String,
    pub name: String,
    pub version: String,
    pub fips_backend: String,
    #[serde(default)]
    pub role: Option<NodeRole>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub service: Option<ServiceRegistration>,
}

#[derive(Debug, Serialize)]
pub struct EnrollResponse {
    pub node_id: Uuid,
    /// Plaintext API key. Shown exactly once.
    pub api_key: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/v1/fleet/enroll", post(enroll))
}

/// POST /api/v1/fleet/enroll — join the fleet.
///
/// 1. Resolve the token secret (miss = `InvalidCredentials`).
/// 2. Reject expired/exhausted tokens up front for a precise error; the
///    atomic consume re-checks both inside the enroll transaction.
/// 3. Enforce the token's pinned role.
/// 4. Consume one use and create the node (status `online`, compliance
///    `unknown`).
/// 5. Return `{node_id, api_key}` and emit `node_joined`.
async fn enroll(
    State(state): State<AppState>,
    Json(body): Json<EnrollRequest>,
) -> Result<Json<EnrollResponse>, ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::bad_request("name must not be empty"));
    }

    let token = state.store.find_token_by_secret(&body.token).await?;

    let now = chrono::Utc::now();
    if token.is_expired(now) {
        return Err(ApiError(FleetError::TokenExpired));
    }
    if token.is_exhausted() {
        return Err(ApiError(FleetError::TokenExhausted));
    }

    let role = match (token.role, body.role) {
        (Some(pinned), Some(requested)) if pinned != requested => {
            return Err(ApiError(FleetError::RoleMismatch {
                expected: pinned.as_str().into(),
                requested: requested.as_str().into(),
            }));
        }
        (Some(pinned), _) => pinned,
        (None, Some(requested)) => requested,
        (None, None) => NodeRole::Client,
    };

    let region = body.region.or_else(|| token.region.clone());
    let (node, api_key) = state
        .store
        .enroll_node(
            &token,
            NewNode {
                name: body.name,
                role,
                region,
                version: body.version,
                fips_backend: body.fips_backend,
                service: body.service,
            },
        )
        .await?;

    tracing::info!(node = %node.id, name = %node.name, role = %node.role, "node enrolled");
    let response = EnrollResponse {
        node_id: node.id,
        api_key,
    };
    state
        .hub
        .emit(FleetEvent::for_node(FleetEventKind::NodeJoined, node))
        .await;

    Ok(Json(response))
}
