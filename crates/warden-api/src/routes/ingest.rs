//! # Posture Ingest
//!
//! Node-authenticated report submission and heartbeats. A report fully
//! shadows the previous one, updates the denormalized summary and liveness
//! status, is evaluated against the active policy, and produces exactly one
//! `node_updated` event — emitted only after everything is persisted, so an
//! observer can always read back the state an event describes.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use warden_core::{
    ComplianceReport, EnforcementMode, FleetEvent, FleetEventKind, Node, NodeStatus,
};

use crate::auth::AuthedNode;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ReportSubmission {
    pub node_id: Uuid,
    /// Opaque report document; only the typed projection is inspected.
    pub report: serde_json::Value,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/fleet/report", post(submit_report))
        .route("/api/v1/fleet/heartbeat", post(heartbeat))
}

/// POST /api/v1/fleet/report — submit the node's compliance report.
async fn submit_report(
    State(state): State<AppState>,
    AuthedNode(node): AuthedNode,
    Json(body): Json<ReportSubmission>,
) -> Result<Json<Node>, ApiError> {
    if body.node_id != node.id {
        return Err(ApiError::forbidden(
            "node_id does not match the authenticated node",
        ));
    }

    let projection = ComplianceReport::from_value(&body.report);
    let status = if projection.summary.failed == 0 {
        NodeStatus::Online
    } else {
        NodeStatus::Degraded
    };

    let mut updated = state
        .store
        .store_report(node.id, &body.report, projection.summary, status)
        .await?;

    let policy = state.policy.current();
    if policy.enforcement_mode != EnforcementMode::Disabled {
        let (verdict, detail) = warden_policy::evaluate(&projection, &policy);
        if let Some(detail) = &detail {
            tracing::debug!(node = %node.id, verdict = %verdict, detail, "report evaluated");
        }
        updated = state.store.set_compliance_status(node.id, verdict).await?;
    }

    state
        .hub
        .emit(FleetEvent::for_node(
            FleetEventKind::NodeUpdated,
            updated.clone(),
        ))
        .await;

    Ok(Json(updated))
}

/// POST /api/v1/fleet/heartbeat — touch last-seen; nothing else changes.
async fn heartbeat(
    State(state): State<AppState>,
    AuthedNode(node): AuthedNode,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .store
        .update_heartbeat(node.id, chrono::Utc::now())
        .await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}
