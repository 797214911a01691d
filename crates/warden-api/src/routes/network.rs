//! # Network Observation Endpoints
//!
//! Read-only window onto the ClientHello inspector: aggregate
//! FIPS-capability counts plus the most recent observations from the ring
//! buffer. Feeds the dashboard's client-capability panel.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use warden_verifier::{ClientHelloRecord, HelloAggregates};

use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_RECENT_LIMIT: usize = 100;
const MAX_RECENT_LIMIT: usize = 1000;

#[derive(Debug, Default, Deserialize)]
pub struct ClientsQuery {
    /// Maximum number of recent observations to return (default 100).
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ObservedClientsResponse {
    pub aggregates: HelloAggregates,
    /// Most recent observations, oldest first.
    pub recent: Vec<ClientHelloRecord>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/v1/network/clients", get(observed_clients))
}

/// GET /api/v1/network/clients — observed TLS client capability.
async fn observed_clients(
    State(state): State<AppState>,
    Query(query): Query<ClientsQuery>,
) -> Result<Json<ObservedClientsResponse>, ApiError> {
    let limit = match query.limit {
        None => DEFAULT_RECENT_LIMIT,
        Some(0) => return Err(ApiError::bad_request("limit must be >= 1")),
        Some(limit) => limit.min(MAX_RECENT_LIMIT),
    };

    Ok(Json(ObservedClientsResponse {
        aggregates: state.inspector.aggregates(),
        recent: state.inspector.recent(limit),
    }))
}
