//! # Device Posture Endpoints
//!
//! Unauthenticated, device-scoped posture push and the admin-facing
//! listing. Posture lives only in memory; a restart forgets it and agents
//! re-push on their next interval.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};

use warden_core::DevicePosture;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/v1/posture", post(push_posture).get(list_posture))
}

/// POST /api/v1/posture — upsert one device's posture snapshot.
async fn push_posture(
    State(state): State<AppState>,
    Json(posture): Json<DevicePosture>,
) -> Result<StatusCode, ApiError> {
    if posture.device_id.trim().is_empty() {
        return Err(ApiError::bad_request("device_id must not be empty"));
    }
    state.posture.upsert(posture);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/posture — all known device postures.
async fn list_posture(State(state): State<AppState>) -> Json<Vec<DevicePosture>> {
    Json(state.posture.list())
}
