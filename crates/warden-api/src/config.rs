//! # Controller Configuration
//!
//! Runtime settings for the API layer, resolved by `wardend` from CLI flags
//! merged over an optional JSON config file (flags win). Handlers only see
//! the resolved [`ApiConfig`].

use std::path::PathBuf;

use serde::Deserialize;

use warden_core::FleetError;

/// Resolved controller configuration.
#[derive(Debug, Clone, Default)]
pub struct ApiConfig {
    /// Admin bearer key. `None` leaves admin endpoints open (development
    /// mode); `wardend` logs loudly when running that way.
    pub admin_key: Option<String>,
    /// Build manifest JSON served at `/manifest`.
    pub manifest_path: Option<PathBuf>,
    /// Local crypto self-test results consumed by the aggregator.
    pub selftest_path: Option<PathBuf>,
    /// Controller version reported by `/health` and the aggregator.
    pub version: String,
}

impl ApiConfig {
    pub fn new() -> Self {
        Self {
            admin_key: None,
            manifest_path: None,
            selftest_path: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// On-disk config file shape. Every field is optional; CLI flags override.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub admin_key: Option<String>,
    #[serde(default)]
    pub manifest_path: Option<PathBuf>,
    #[serde(default)]
    pub selftest_path: Option<PathBuf>,
    #[serde(default)]
    pub cf_api_token: Option<String>,
    #[serde(default)]
    pub cf_zone_id: Option<String>,
    #[serde(default)]
    pub cf_account_id: Option<String>,
    #[serde(default)]
    pub cf_tunnel_id: Option<String>,
}

impl ConfigFile {
    /// Load and parse the config file.
    pub fn load(path: &std::path::Path) -> Result<Self, FleetError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| FleetError::BadRequest(format!("read config {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| FleetError::BadRequest(format!("parse config {}: {e}", path.display())))
    }
}
