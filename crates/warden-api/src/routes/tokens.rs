//! # Enrollment Token Administration
//!
//! Admin-only token lifecycle. The create response is the only place the
//! plaintext secret ever appears.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use warden_core::{EnrollmentToken, NodeRole};
use warden_store::NewToken;

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTokenRequest {
    #[serde(default)]
    pub role: Option<NodeRole>,
    #[serde(default)]
    pub region: Option<String>,
    /// 0 (the default) means unlimited uses.
    #[serde(default)]
    pub max_uses: i64,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Create response: the token record plus its one-time plaintext secret.
#[derive(Debug, Serialize)]
pub struct CreatedTokenResponse {
    /// Plaintext enrollment secret. Shown exactly once.
    pub token: String,
    #[serde(flatten)]
    pub record: EnrollmentToken,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/fleet/tokens", post(create_token).get(list_tokens))
        .route("/api/v1/fleet/tokens/{id}", delete(delete_token))
}

/// POST /api/v1/fleet/tokens — mint an enrollment token.
async fn create_token(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Json(body): Json<CreateTokenRequest>,
) -> Result<(StatusCode, Json<CreatedTokenResponse>), ApiError> {
    if let Some(expires_at) = body.expires_at {
        if expires_at <= Utc::now() {
            return Err(ApiError::bad_request("expires_at is already in the past"));
        }
    }

    let (record, token) = state
        .store
        .create_token(NewToken {
            role: body.role,
            region: body.region,
            max_uses: body.max_uses,
            expires_at: body.expires_at,
        })
        .await?;

    tracing::info!(token = %record.id, role = ?record.role, max_uses = record.max_uses, "enrollment token created");
    Ok((
        StatusCode::CREATED,
        Json(CreatedTokenResponse { token, record }),
    ))
}

/// GET /api/v1/fleet/tokens — list token records (hashes never included).
async fn list_tokens(
    State(state): State<AppState>,
    _admin: AdminAuth,
) -> Result<Json<Vec<EnrollmentToken>>, ApiError> {
    Ok(Json(state.store.list_tokens().await?))
}

/// DELETE /api/v1/fleet/tokens/{id} — revoke a token.
async fn delete_token(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_token(id).await?;
    tracing::info!(token = %id, "enrollment token deleted");
    Ok(StatusCode::NO_CONTENT)
}
