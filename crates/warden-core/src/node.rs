//! # Node Records — Fleet Membership Model
//!
//! A [`Node`] is a process that has successfully enrolled with the
//! controller. Its record carries the admin-facing identity fields, the
//! denormalized summary of its latest compliance report, and the derived
//! status pair (`status` from heartbeats, `compliance_status` from policy
//! evaluation).
//!
//! The node's API-key hash is deliberately NOT part of this struct: it never
//! leaves the store layer, so no serialization path can leak it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::report::ReportSummary;

/// Role a node plays in the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// The central controller itself (self-registration).
    Controller,
    /// A traffic-serving node, eligible for the routing table.
    Server,
    /// A forwarding-only node.
    Proxy,
    /// An endpoint that reports posture but serves no traffic.
    Client,
}

impl NodeRole {
    /// String identifier used on the wire and in the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Controller => "controller",
            Self::Server => "server",
            Self::Proxy => "proxy",
            Self::Client => "client",
        }
    }

    /// Parse a role from its wire string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "controller" => Some(Self::Controller),
            "server" => Some(Self::Server),
            "proxy" => Some(Self::Proxy),
            "client" => Some(Self::Client),
            _ => None,
        }
    }
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Liveness status derived from report ingest and the heartbeat sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Heartbeating and last report had no failures.
    Online,
    /// Heartbeating but last report carried failures.
    Degraded,
    /// No heartbeat within the staleness threshold.
    Offline,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Degraded => "degraded",
            Self::Offline => "offline",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "online" => Some(Self::Online),
            "degraded" => Some(Self::Degraded),
            "offline" => Some(Self::Offline),
            _ => None,
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of policy evaluation over the node's latest report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Compliant,
    NonCompliant,
    /// No report evaluated yet, or evaluation disabled.
    Unknown,
}

impl ComplianceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compliant => "compliant",
            Self::NonCompliant => "non_compliant",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "compliant" => Some(Self::Compliant),
            "non_compliant" => Some(Self::NonCompliant),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl std::fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a server-role node accepts traffic. Optional at enrollment;
/// the routing gate projects it into route entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRegistration {
    pub host: String,
    pub port: u16,
    /// Whether the service endpoint terminates TLS itself.
    #[serde(default)]
    pub tls: bool,
}

/// A fleet member. Created on successful enrollment, mutated only by report
/// ingest, policy evaluation, and the heartbeat sweeper; deleted explicitly
/// by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Controller-assigned opaque identifier.
    pub id: Uuid,
    /// Admin label; not unique.
    pub name: String,
    pub role: NodeRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Agent version string as reported at enrollment.
    pub version: String,
    /// Name of the crypto backend the node claims to run.
    pub fips_backend: String,
    pub status: NodeStatus,
    pub compliance_status: ComplianceStatus,
    pub last_heartbeat_at: DateTime<Utc>,
    /// Denormalized summary counts of the latest report, for cheap listing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_summary: Option<ReportSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceRegistration>,
    pub created_at: DateTime<Utc>,
}

impl Node {
    /// Whether the heartbeat is older than `threshold` as of `now`.
    pub fn heartbeat_stale(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        now - self.last_heartbeat_at > threshold
    }
}

/// Aggregate fleet counts, keyed by the wire strings of each axis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetSummary {
    pub total: i64,
    pub by_role: BTreeMap<String, i64>,
    pub by_status: BTreeMap<String, i64>,
    pub by_compliance: BTreeMap<String, i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trip() {
        for role in [
            NodeRole::Controller,
            NodeRole::Server,
            NodeRole::Proxy,
            NodeRole::Client,
        ] {
            assert_eq!(NodeRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(NodeRole::parse("gateway"), None);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&ComplianceStatus::NonCompliant).unwrap();
        assert_eq!(json, r#""non_compliant""#);
    }

    #[test]
    fn heartbeat_staleness() {
        let now = Utc::now();
        let node = Node {
            id: Uuid::new_v4(),
            name: "s1".into(),
            role: NodeRole::Server,
            region: None,
            version: "1.0.0".into(),
            fips_backend: "openssl-fips".into(),
            status: NodeStatus::Online,
            compliance_status: ComplianceStatus::Unknown,
            last_heartbeat_at: now - chrono::Duration::seconds(200),
            report_summary: None,
            service: None,
            created_at: now,
        };
        assert!(node.heartbeat_stale(now, chrono::Duration::seconds(180)));
        assert!(!node.heartbeat_stale(now, chrono::Duration::seconds(300)));
    }

    #[test]
    fn api_key_material_absent_from_serialized_node() {
        let node = Node {
            id: Uuid::new_v4(),
            name: "s1".into(),
            role: NodeRole::Server,
            region: Some("eu-west".into()),
            version: "1.0.0".into(),
            fips_backend: "boringcrypto".into(),
            status: NodeStatus::Online,
            compliance_status: ComplianceStatus::Compliant,
            last_heartbeat_at: Utc::now(),
            report_summary: None,
            service: None,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&node).unwrap();
        assert!(!json.contains("api_key"));
        assert!(!json.contains("hash"));
    }
}
