//! # Device Posture
//!
//! Endpoint posture pushed by device agents (MDM-style): OS identity, FIPS
//! mode, disk encryption, enrollment state. Posture is in-memory only —
//! keyed by device id, upserted on every push — and joined with the
//! ClientHello inspector's aggregates by the compliance aggregator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Posture snapshot for one endpoint device. Every field except the key is
/// optional; agents report what they can observe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicePosture {
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_fips_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_encrypted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mdm_enrolled: Option<bool>,
    #[serde(default = "Utc::now")]
    pub last_seen: DateTime<Utc>,
}
