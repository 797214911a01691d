//! # Remediation Endpoints
//!
//! Admin creates a plan; the target node long-polls for it and posts its
//! result; the plan endpoint suggests actions from the node's latest
//! failing checks without changing any state.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use warden_core::{
    CheckStatus, ComplianceReport, FleetEvent, FleetEventKind, RemediationRequest,
};
use warden_policy::{CHECK_APPROVED_BACKEND, CHECK_DISK_ENCRYPTION, CHECK_FIPS_BACKEND, CHECK_OS_FIPS};

use crate::auth::{AdminAuth, AuthedNode};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateRemediationRequest {
    pub actions: Vec<String>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Deserialize)]
pub struct RemediationResultRequest {
    pub request_id: Uuid,
    /// Opaque result document from the agent.
    pub result: serde_json::Value,
    /// Whether the agent considers the remediation successful.
    #[serde(default = "default_success")]
    pub success: bool,
}

fn default_success() -> bool {
    true
}

/// One suggested action from the plan catalogue.
#[derive(Debug, Clone, Serialize)]
pub struct PlanAction {
    pub id: &'static str,
    pub description: &'static str,
    /// Safe for the agent to run without operator supervision.
    pub auto_exec: bool,
    pub instructions: &'static str,
    /// The well-known check whose failure suggested this action.
    pub failed_check: String,
}

#[derive(Debug, Serialize)]
pub struct RemediationPlan {
    pub node_id: Uuid,
    pub actions: Vec<PlanAction>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/fleet/nodes/{id}/remediate",
            post(create_remediation).get(poll_remediations),
        )
        .route(
            "/api/v1/fleet/nodes/{id}/remediate/result",
            post(post_result),
        )
        .route("/api/v1/fleet/remediate/plan/{id}", get(plan))
}

/// POST /api/v1/fleet/nodes/{id}/remediate — create a pending request.
async fn create_remediation(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(node_id): Path<Uuid>,
    Json(body): Json<CreateRemediationRequest>,
) -> Result<(StatusCode, Json<RemediationRequest>), ApiError> {
    let request = state
        .store
        .create_remediation(node_id, body.actions, body.dry_run)
        .await?;

    tracing::info!(node = %node_id, request = %request.id, dry_run = request.dry_run, "remediation requested");
    let node = state.store.get_node(node_id).await?;
    state
        .hub
        .emit(FleetEvent::for_node(
            FleetEventKind::RemediationRequested,
            node,
        ))
        .await;

    Ok((StatusCode::CREATED, Json(request)))
}

/// GET /api/v1/fleet/nodes/{id}/remediate — node poll.
///
/// Only the node itself may poll its queue; each returned request is now
/// `delivered` and stays visible until a result arrives.
async fn poll_remediations(
    State(state): State<AppState>,
    AuthedNode(node): AuthedNode,
    Path(node_id): Path<Uuid>,
) -> Result<Json<Vec<RemediationRequest>>, ApiError> {
    if node.id != node_id {
        return Err(ApiError::forbidden(
            "nodes may only poll their own remediation queue",
        ));
    }
    Ok(Json(state.store.poll_remediations(node.id).await?))
}

/// POST /api/v1/fleet/nodes/{id}/remediate/result — node posts its result.
async fn post_result(
    State(state): State<AppState>,
    AuthedNode(node): AuthedNode,
    Path(node_id): Path<Uuid>,
    Json(body): Json<RemediationResultRequest>,
) -> Result<Json<RemediationRequest>, ApiError> {
    if node.id != node_id {
        return Err(ApiError::forbidden(
            "nodes may only post results for their own requests",
        ));
    }

    let request = state
        .store
        .complete_remediation(body.request_id, node.id, body.result, body.success)
        .await?;

    tracing::info!(node = %node.id, request = %request.id, status = %request.status, "remediation result posted");
    state
        .hub
        .emit(FleetEvent::for_node(
            FleetEventKind::RemediationCompleted,
            node,
        ))
        .await;

    Ok(Json(request))
}

/// GET /api/v1/fleet/remediate/plan/{id} — suggested actions for a node.
///
/// Maps failing well-known checks in the node's latest report onto the
/// action catalogue. Pure suggestion surface; nothing is created.
async fn plan(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(node_id): Path<Uuid>,
) -> Result<Json<RemediationPlan>, ApiError> {
    state.store.get_node(node_id).await?;
    let report = state
        .store
        .latest_report(node_id)
        .await?
        .map(|raw| ComplianceReport::from_value(&raw))
        .unwrap_or_default();

    let actions = plan_actions(&report);
    Ok(Json(RemediationPlan { node_id, actions }))
}

/// Catalogue lookup: failing well-known check name → suggested action.
fn plan_actions(report: &ComplianceReport) -> Vec<PlanAction> {
    let mut actions = Vec::new();
    for name in [
        CHECK_FIPS_BACKEND,
        CHECK_OS_FIPS,
        CHECK_DISK_ENCRYPTION,
        CHECK_APPROVED_BACKEND,
    ] {
        let Some(item) = report.find_item(name) else {
            continue;
        };
        if item.status != CheckStatus::Fail && item.status != CheckStatus::Warning {
            continue;
        }
        if let Some(template) = catalogue_entry(name) {
            actions.push(PlanAction {
                failed_check: name.to_string(),
                ..template
            });
        }
    }
    actions
}

fn catalogue_entry(check: &str) -> Option<PlanAction> {
    let template = match check {
        CHECK_OS_FIPS => PlanAction {
            id: "enable_os_fips",
            description: "Enable the operating system's FIPS mode",
            auto_exec: false,
            instructions: "Enable the OS FIPS profile (e.g. fips-mode-setup --enable) and reboot.",
            failed_check: String::new(),
        },
        CHECK_DISK_ENCRYPTION => PlanAction {
            id: "enable_disk_encryption",
            description: "Encrypt the node's data volumes",
            auto_exec: false,
            instructions: "Migrate data volumes onto LUKS-encrypted devices; attach keys via TPM or KMS.",
            failed_check: String::new(),
        },
        CHECK_FIPS_BACKEND | CHECK_APPROVED_BACKEND => PlanAction {
            id: "switch_crypto_backend",
            description: "Switch the agent to a validated crypto backend",
            auto_exec: true,
            instructions: "Restart the agent with its validated crypto backend enabled and re-run self-tests.",
            failed_check: String::new(),
        },
        _ => return None,
    };
    Some(template)
}
