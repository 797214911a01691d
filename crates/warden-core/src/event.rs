//! # Fleet Events
//!
//! The event vocabulary carried by the in-process bus and fanned out to SSE
//! subscribers. Events are fire-and-forget: no replay, no durability; a
//! disconnected subscriber loses whatever was in flight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::node::{FleetSummary, Node};

/// What happened. Doubles as the SSE `event:` name via [`as_str`].
///
/// [`as_str`]: FleetEventKind::as_str
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FleetEventKind {
    /// A node completed enrollment.
    NodeJoined,
    /// A node's status, compliance verdict, or report changed.
    NodeUpdated,
    /// A node was deleted by an admin.
    NodeRemoved,
    /// An admin created a remediation request.
    RemediationRequested,
    /// A node posted a remediation result.
    RemediationCompleted,
    /// Periodic aggregate snapshot.
    FleetSummary,
}

impl FleetEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NodeJoined => "node_joined",
            Self::NodeUpdated => "node_updated",
            Self::NodeRemoved => "node_removed",
            Self::RemediationRequested => "remediation_requested",
            Self::RemediationCompleted => "remediation_completed",
            Self::FleetSummary => "fleet_summary",
        }
    }
}

impl std::fmt::Display for FleetEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event on the bus. `node` is present for node-scoped kinds, `summary`
/// for the periodic snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetEvent {
    #[serde(rename = "type")]
    pub kind: FleetEventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<Node>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<FleetSummary>,
    pub time: DateTime<Utc>,
}

impl FleetEvent {
    /// A node-scoped event stamped now.
    pub fn for_node(kind: FleetEventKind, node: Node) -> Self {
        Self {
            kind,
            node: Some(node),
            summary: None,
            time: Utc::now(),
        }
    }

    /// A fleet-summary snapshot event stamped now.
    pub fn summary(summary: FleetSummary) -> Self {
        Self {
            kind: FleetEventKind::FleetSummary,
            node: None,
            summary: Some(summary),
            time: Utc::now(),
        }
    }
}
