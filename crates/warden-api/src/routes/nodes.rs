//! # Fleet Queries and the Routing Gate
//!
//! Node listing/lookup/deletion, the latest raw report, the aggregate
//! summary, and the effective route table. The routing gate is a pure
//! projection of current store state: server-role nodes are `routable`
//! when online and, under enforce mode, compliant.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use warden_core::{
    ComplianceStatus, EnforcementMode, FleetEvent, FleetEventKind, FleetSummary, Node, NodeRole,
    NodeStatus, ServiceRegistration,
};
use warden_store::NodeFilter;

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct NodesQuery {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// One row of the effective route table.
#[derive(Debug, Serialize)]
pub struct RouteEntry {
    pub node_id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceRegistration>,
    pub status: NodeStatus,
    pub compliance_status: ComplianceStatus,
    pub routable: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/fleet/nodes", get(list_nodes))
        .route("/api/v1/fleet/nodes/{id}", get(get_node).delete(delete_node))
        .route("/api/v1/fleet/nodes/{id}/report", get(node_report))
        .route("/api/v1/fleet/summary", get(fleet_summary))
        .route("/api/v1/fleet/routes", get(route_table))
}

/// GET /api/v1/fleet/nodes — list nodes, optionally filtered.
async fn list_nodes(
    State(state): State<AppState>,
    Query(query): Query<NodesQuery>,
) -> Result<Json<Vec<Node>>, ApiError> {
    let filter = parse_filter(&query)?;
    Ok(Json(state.store.list_nodes(&filter).await?))
}

fn parse_filter(query: &NodesQuery) -> Result<NodeFilter, ApiError> {
    let role = query
        .role
        .as_deref()
        .map(|raw| {
            NodeRole::parse(raw).ok_or_else(|| ApiError::bad_request(format!("unknown role {raw:?}")))
        })
        .transpose()?;
    let status = query
        .status
        .as_deref()
        .map(|raw| {
            NodeStatus::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown status {raw:?}")))
        })
        .transpose()?;

    Ok(NodeFilter {
        role,
        region: query.region.clone(),
        status,
    })
}

/// GET /api/v1/fleet/nodes/{id} — fetch one node.
async fn get_node(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Node>, ApiError> {
    Ok(Json(state.store.get_node(id).await?))
}

/// DELETE /api/v1/fleet/nodes/{id} — remove a node; its report and
/// remediation requests cascade.
async fn delete_node(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let node = state.store.get_node(id).await?;
    state.store.delete_node(id).await?;
    tracing::info!(node = %id, name = %node.name, "node deleted");
    state
        .hub
        .emit(FleetEvent::for_node(FleetEventKind::NodeRemoved, node))
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/fleet/nodes/{id}/report — the latest raw report document.
async fn node_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // Distinguish "no such node" from "no report yet".
    state.store.get_node(id).await?;
    let report = state
        .store
        .latest_report(id)
        .await?
        .ok_or_else(|| warden_core::FleetError::NotFound(format!("no report for node {id}")))?;
    Ok(Json(report))
}

/// GET /api/v1/fleet/summary — aggregate counts.
async fn fleet_summary(
    State(state): State<AppState>,
) -> Result<Json<FleetSummary>, ApiError> {
    Ok(Json(state.store.fleet_summary().await?))
}

/// GET /api/v1/fleet/routes — the effective route table.
///
/// Non-compliant servers stay visible with `routable: false`; under
/// `enforce` they are simply never routable.
async fn route_table(
    State(state): State<AppState>,
) -> Result<Json<Vec<RouteEntry>>, ApiError> {
    let servers = state
        .store
        .list_nodes(&NodeFilter {
            role: Some(NodeRole::Server),
            ..Default::default()
        })
        .await?;
    let enforcing = state.policy.current().enforcement_mode == EnforcementMode::Enforce;

    let entries = servers
        .into_iter()
        .map(|node| {
            let online = node.status == NodeStatus::Online;
            let compliant_enough =
                !enforcing || node.compliance_status == ComplianceStatus::Compliant;
            RouteEntry {
                node_id: node.id,
                name: node.name,
                service: node.service,
                status: node.status,
                compliance_status: node.compliance_status,
                routable: online && compliant_enough,
            }
        })
        .collect();

    Ok(Json(entries))
}
