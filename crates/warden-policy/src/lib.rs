//! # warden-policy — Compliance Evaluation
//!
//! Evaluates a node's compliance report against the active policy and
//! derives its compliance status. The evaluation walks the policy's
//! requirements in a fixed order and short-circuits on the first failure,
//! so the returned detail always names the first unmet requirement.
//!
//! The active policy is held behind [`PolicyHandle`]: readers load the
//! current `Arc` once per request, writers swap it atomically. In-flight
//! evaluations keep the policy they loaded; nothing is rerun retroactively.

pub mod evaluator;

use std::sync::Arc;

use parking_lot::RwLock;

use warden_core::CompliancePolicy;

pub use evaluator::{
    evaluate, well_known_checks, CHECK_APPROVED_BACKEND, CHECK_DISK_ENCRYPTION,
    CHECK_FIPS_BACKEND, CHECK_OS_FIPS,
};

/// Shared handle to the process-wide active policy.
///
/// Cloning the handle shares the same slot. `current()` is a pointer load
/// plus an `Arc` bump; `replace()` swaps the pointer under a short write
/// lock. The lock is never held across I/O.
#[derive(Clone)]
pub struct PolicyHandle {
    slot: Arc<RwLock<Arc<CompliancePolicy>>>,
}

impl PolicyHandle {
    /// Start with the default policy (audit mode, all flags required).
    pub fn new() -> Self {
        Self::with_policy(CompliancePolicy::default())
    }

    /// Start with an explicit policy.
    pub fn with_policy(policy: CompliancePolicy) -> Self {
        Self {
            slot: Arc::new(RwLock::new(Arc::new(policy))),
        }
    }

    /// Load the active policy. Callers evaluate against this snapshot even
    /// if the policy is replaced mid-request.
    pub fn current(&self) -> Arc<CompliancePolicy> {
        self.slot.read().clone()
    }

    /// Install a replacement policy. Takes effect on the next load.
    pub fn replace(&self, policy: CompliancePolicy) {
        let mode = policy.enforcement_mode;
        *self.slot.write() = Arc::new(policy);
        tracing::info!(enforcement_mode = %mode, "compliance policy replaced");
    }
}

impl Default for PolicyHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PolicyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyHandle")
            .field("policy", &*self.current())
            .finish()
    }
}
