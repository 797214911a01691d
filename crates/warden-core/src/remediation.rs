//! # Remediation Requests
//!
//! Admin-issued directives delivered to a node on its next poll and
//! completed when the node posts a result.
//!
//! ```text
//!         create(admin)
//! pending ─────────────▶ delivered ──node posts result──▶ completed | failed
//!    ▲                       │
//!    └──── delivery TTL ─────┘
//! ```
//!
//! A `delivered` request that never receives a result is swept back to
//! `pending` after the delivery TTL so the node's next poll re-offers it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a remediation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationStatus {
    /// Created; not yet seen by the node.
    Pending,
    /// Returned to the node on a poll; awaiting a result.
    Delivered,
    /// Node posted a successful result.
    Completed,
    /// Node posted a failure result.
    Failed,
}

impl RemediationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "delivered" => Some(Self::Delivered),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// States in which the request is still offered to the node on a poll.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Delivered)
    }
}

impl std::fmt::Display for RemediationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An admin-issued remediation directive for one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationRequest {
    pub id: Uuid,
    pub node_id: Uuid,
    /// Action identifiers the node's agent should execute, in order.
    pub actions: Vec<String>,
    /// When set, the agent reports what it would do without doing it.
    #[serde(default)]
    pub dry_run: bool,
    pub status: RemediationStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Result document posted by the node; opaque to the controller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_states() {
        assert!(RemediationStatus::Pending.is_open());
        assert!(RemediationStatus::Delivered.is_open());
        assert!(!RemediationStatus::Completed.is_open());
        assert!(!RemediationStatus::Failed.is_open());
    }

    #[test]
    fn status_round_trip() {
        for s in [
            RemediationStatus::Pending,
            RemediationStatus::Delivered,
            RemediationStatus::Completed,
            RemediationStatus::Failed,
        ] {
            assert_eq!(RemediationStatus::parse(s.as_str()), Some(s));
        }
    }
}
