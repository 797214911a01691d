//! # Compliance Policy
//!
//! The process-wide policy that decides whether a node's report marks it
//! compliant, and whether that verdict has teeth (the routing gate). There
//! is exactly one active policy; replacement is atomic and takes effect on
//! the next report evaluation.

use serde::{Deserialize, Serialize};

/// What the controller does with a non-compliant verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMode {
    /// Non-compliant server nodes are removed from the route table.
    Enforce,
    /// Verdicts are recorded but routing is unaffected.
    Audit,
    /// Evaluation is skipped entirely; nodes stay `unknown`.
    Disabled,
}

impl EnforcementMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enforce => "enforce",
            Self::Audit => "audit",
            Self::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for EnforcementMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The active compliance policy. Each `require_*` flag names a well-known
/// check the policy engine looks up in the node's report; "FIPS backend
/// active" is required unconditionally and has no flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompliancePolicy {
    pub enforcement_mode: EnforcementMode,
    /// Require the "OS FIPS mode" check to pass.
    #[serde(default = "default_flag")]
    pub require_os_fips: bool,
    /// Require the "Disk encryption" check to pass.
    #[serde(default = "default_flag")]
    pub require_disk_enc: bool,
    /// Require the "Approved crypto backend" check to pass.
    #[serde(default = "default_flag")]
    pub require_approved_backend: bool,
}

fn default_flag() -> bool {
    true
}

impl Default for CompliancePolicy {
    /// Controller start state: audit mode with every flag required, so the
    /// first policy decision an operator makes is whether to enforce, not
    /// what to check.
    fn default() -> Self {
        Self {
            enforcement_mode: EnforcementMode::Audit,
            require_os_fips: true,
            require_disk_enc: true,
            require_approved_backend: true,
        }
    }
}
