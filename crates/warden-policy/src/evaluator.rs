//! # Policy Evaluator
//!
//! The ordered, short-circuiting rule walk that turns a report plus the
//! active policy into a compliance status. Each `require_*` flag names one
//! well-known check; "FIPS backend active" is required unconditionally.
//!
//! A check that is missing from the report counts as failed: an agent that
//! stops reporting a required check must not stay compliant by omission.

use warden_core::{CheckStatus, ComplianceReport, CompliancePolicy, ComplianceStatus, EnforcementMode};

/// Always required, independent of policy flags.
pub const CHECK_FIPS_BACKEND: &str = "FIPS backend active";
/// Required when `require_os_fips` is set.
pub const CHECK_OS_FIPS: &str = "OS FIPS mode";
/// Required when `require_disk_enc` is set.
pub const CHECK_DISK_ENCRYPTION: &str = "Disk encryption";
/// Required when `require_approved_backend` is set.
pub const CHECK_APPROVED_BACKEND: &str = "Approved crypto backend";

/// The well-known check names the engine can consult, in evaluation order.
pub fn well_known_checks() -> &'static [&'static str] {
    &[
        CHECK_FIPS_BACKEND,
        CHECK_OS_FIPS,
        CHECK_DISK_ENCRYPTION,
        CHECK_APPROVED_BACKEND,
    ]
}

/// Evaluate `report` under `policy`.
///
/// Returns the derived status and, for non-compliant verdicts, a detail
/// naming the first requirement that failed. With enforcement disabled the
/// verdict is `Unknown` and nothing is inspected.
pub fn evaluate(
    report: &ComplianceReport,
    policy: &CompliancePolicy,
) -> (ComplianceStatus, Option<String>) {
    if policy.enforcement_mode == EnforcementMode::Disabled {
        return (ComplianceStatus::Unknown, Some("evaluation disabled".into()));
    }

    let requirements: [(&str, bool); 4] = [
        (CHECK_FIPS_BACKEND, true),
        (CHECK_OS_FIPS, policy.require_os_fips),
        (CHECK_DISK_ENCRYPTION, policy.require_disk_enc),
        (CHECK_APPROVED_BACKEND, policy.require_approved_backend),
    ];

    for (name, required) in requirements {
        if !required {
            continue;
        }
        match report.find_item(name) {
            Some(item) if item.status == CheckStatus::Pass => {}
            Some(item) => {
                return (
                    ComplianceStatus::NonCompliant,
                    Some(format!("{name}: {}", item.status)),
                );
            }
            None => {
                return (
                    ComplianceStatus::NonCompliant,
                    Some(format!("{name}: not reported")),
                );
            }
        }
    }

    (ComplianceStatus::Compliant, None)
}
