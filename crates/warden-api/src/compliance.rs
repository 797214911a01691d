//! # Compliance Aggregator
//!
//! Builds the controller's own compliance report by joining every evidence
//! source it can reach:
//!
//! | Section | Items  | Source                               | Method   |
//! |---------|--------|--------------------------------------|----------|
//! | `ce`    | `ce-*` | local crypto self-test results file  | direct   |
//! | `cp`    | `cp-*` | remote edge-configuration probe      | api      |
//! | `tn`    | `tn-*` | ClientHello inspector + device posture | probe / reported |
//! | `bd`    | `bd-*` | build manifest metadata              | inherited |
//!
//! Item ids are stable so UI and test assertions can refer to them. Every
//! evidence failure degrades to an `unknown` item; the aggregate never
//! fails to build.

use std::path::Path;

use warden_core::{
    CheckStatus, ComplianceReport, ReportItem, ReportSection, ReportSummary, VerificationMethod,
};

use crate::state::AppState;

/// Build the controller's current compliance report.
pub async fn build_controller_report(state: &AppState) -> ComplianceReport {
    let mut sections = vec![selftest_section(state.config.selftest_path.as_deref())];

    if let Some(edge) = &state.edge {
        sections.push(ReportSection {
            id: "cp".into(),
            name: "Edge Configuration".into(),
            items: edge.edge_checks().await,
        });
    }

    sections.push(network_section(state));
    sections.push(build_section(state));

    let summary = ReportSummary::tally(&sections);
    ComplianceReport { summary, sections }
}

/// Local crypto self-test results, read from the configured JSON file.
///
/// The file holds a `ReportItem` array produced by the self-test runner.
/// A missing or unreadable file yields one `unknown` item instead of an
/// error; the controller keeps reporting with degraded evidence.
pub fn selftest_section(path: Option<&Path>) -> ReportSection {
    let items = match path {
        None => vec![ReportItem::with_status(
            "ce-selftest",
            "Crypto self-tests",
            CheckStatus::Unknown,
        )
        .detail("no self-test results file configured")
        .method(VerificationMethod::Direct)],
        Some(path) => match load_selftest_items(path) {
            Ok(items) if items.is_empty() => vec![ReportItem::with_status(
                "ce-selftest",
                "Crypto self-tests",
                CheckStatus::Unknown,
            )
            .detail("self-test results file is empty")
            .method(VerificationMethod::Direct)],
            Ok(items) => items,
            Err(detail) => vec![ReportItem::with_status(
                "ce-selftest",
                "Crypto self-tests",
                CheckStatus::Unknown,
            )
            .detail(detail)
            .method(VerificationMethod::Direct)],
        },
    };

    ReportSection {
        id: "ce".into(),
        name: "Crypto Engine".into(),
        items,
    }
}

fn load_selftest_items(path: &Path) -> Result<Vec<ReportItem>, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("self-test results unreadable: {e}"))?;
    let mut items: Vec<ReportItem> = serde_json::from_str(&raw)
        .map_err(|e| format!("self-test results malformed: {e}"))?;
    for item in &mut items {
        if item.verification_method.is_none() {
            item.verification_method = Some(VerificationMethod::Direct);
        }
    }
    Ok(items)
}

/// ClientHello observations joined with pushed device posture.
fn network_section(state: &AppState) -> ReportSection {
    let agg = state.inspector.aggregates();

    let hello_item = if agg.total_observed == 0 {
        ReportItem::with_status("tn-clienthello", "Client TLS capability", CheckStatus::Unknown)
            .detail("no TLS clients observed yet")
            .method(VerificationMethod::Probe)
    } else {
        let status = if agg.not_capable > 0 {
            CheckStatus::Warning
        } else {
            CheckStatus::Pass
        };
        ReportItem::with_status("tn-clienthello", "Client TLS capability", status)
            .detail(format!(
                "{} observed: {} FIPS-capable, {} not capable, {} indeterminate",
                agg.total_observed, agg.fips_capable, agg.not_capable, agg.indeterminate
            ))
            .method(VerificationMethod::Probe)
    };

    let device_count = state.posture.len();
    let (fips_devices, encrypted_devices) = state.posture.counts();
    let posture_item = if device_count == 0 {
        ReportItem::with_status("tn-posture", "Endpoint posture", CheckStatus::Unknown)
            .detail("no device posture reported yet")
            .method(VerificationMethod::Reported)
    } else {
        let status = if fips_devices == device_count && encrypted_devices == device_count {
            CheckStatus::Pass
        } else {
            CheckStatus::Warning
        };
        ReportItem::with_status("tn-posture", "Endpoint posture", status)
            .detail(format!(
                "{device_count} devices: {fips_devices} OS FIPS, {encrypted_devices} disk-encrypted"
            ))
            .remediation("bring stragglers into FIPS mode and enable disk encryption")
            .method(VerificationMethod::Reported)
    };

    ReportSection {
        id: "tn".into(),
        name: "Transport & Endpoints".into(),
        items: vec![hello_item, posture_item],
    }
}

/// Build/manifest metadata.
fn build_section(state: &AppState) -> ReportSection {
    let manifest_item = match load_manifest(state.config.manifest_path.as_deref()) {
        Ok(manifest) => {
            let build_version = manifest["version"].as_str().unwrap_or("unspecified");
            ReportItem::pass("bd-manifest", "Build manifest")
                .detail(format!("manifest version {build_version}"))
                .method(VerificationMethod::Inherited)
        }
        Err(detail) => {
            ReportItem::with_status("bd-manifest", "Build manifest", CheckStatus::Unknown)
                .detail(detail)
                .method(VerificationMethod::Inherited)
        }
    };

    let version_item = ReportItem::pass("bd-version", "Controller version")
        .detail(state.config.version.clone())
        .method(VerificationMethod::Direct);

    ReportSection {
        id: "bd".into(),
        name: "Build & Manifest".into(),
        items: vec![manifest_item, version_item],
    }
}

/// Load the build manifest file for `/manifest` and the `bd` section.
pub fn load_manifest(path: Option<&Path>) -> Result<serde_json::Value, String> {
    let path = path.ok_or_else(|| "no manifest path configured".to_string())?;
    let raw =
        std::fs::read_to_string(path).map_err(|e| format!("manifest unreadable: {e}"))?;
    serde_json::from_str(&raw).map_err(|e| format!("manifest malformed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn report_builds_without_any_evidence() {
        let state = AppState::for_tests().await;
        let report = build_controller_report(&state).await;

        // No edge client configured: ce, tn, bd sections only.
        let ids: Vec<&str> = report.sections.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["ce", "tn", "bd"]);

        // All evidence is missing, so everything is unknown except the
        // version item.
        let selftest = report.find_item("Crypto self-tests").unwrap();
        assert_eq!(selftest.status, CheckStatus::Unknown);
        assert_eq!(report.summary.failed, 0);
    }

    #[tokio::test]
    async fn selftest_file_items_flow_into_report() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"id": "ce-aes-kat", "name": "AES-GCM known-answer test", "status": "pass"}},
                {{"id": "ce-rng-kat", "name": "DRBG known-answer test", "status": "fail"}}
            ]"#
        )
        .unwrap();

        let section = selftest_section(Some(file.path()));
        assert_eq!(section.items.len(), 2);
        assert_eq!(section.items[0].status, CheckStatus::Pass);
        assert_eq!(
            section.items[0].verification_method,
            Some(VerificationMethod::Direct)
        );
        assert_eq!(section.items[1].status, CheckStatus::Fail);
    }

    #[test]
    fn corrupt_selftest_file_degrades_to_unknown() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let section = selftest_section(Some(file.path()));
        assert_eq!(section.items.len(), 1);
        assert_eq!(section.items[0].status, CheckStatus::Unknown);
        assert!(section.items[0]
            .detail
            .as_deref()
            .unwrap()
            .contains("malformed"));
    }

    #[tokio::test]
    async fn network_section_reflects_inspector_and_posture() {
        let state = AppState::for_tests().await;

        state.inspector.record(warden_verifier::ObservedHello {
            remote_addr: "198.51.100.7:40000".parse().unwrap(),
            server_name: None,
            cipher_suites: vec![0x1301],
            supported_versions: vec![0x0304],
            alpn: vec![],
        });
        state.posture.upsert(warden_core::DevicePosture {
            device_id: "d1".into(),
            os_type: None,
            os_version: None,
            os_fips_enabled: Some(true),
            disk_encrypted: Some(true),
            mdm_enrolled: None,
            last_seen: chrono::Utc::now(),
        });

        let report = build_controller_report(&state).await;
        let hello = report.find_item("Client TLS capability").unwrap();
        assert_eq!(hello.status, CheckStatus::Pass);
        assert_eq!(hello.verification_method, Some(VerificationMethod::Probe));

        let posture = report.find_item("Endpoint posture").unwrap();
        assert_eq!(posture.status, CheckStatus::Pass);
        assert_eq!(
            posture.verification_method,
            Some(VerificationMethod::Reported)
        );
    }

    #[tokio::test]
    async fn manifest_file_feeds_build_section() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"version": "2.4.0", "commit": "abc1234"}}"#).unwrap();

        let store = warden_store::FleetStore::open_in_memory().await.unwrap();
        let mut config = crate::config::ApiConfig::new();
        config.manifest_path = Some(file.path().to_path_buf());
        let state = AppState::new(store, config);

        let report = build_controller_report(&state).await;
        let manifest = report.find_item("Build manifest").unwrap();
        assert_eq!(manifest.status, CheckStatus::Pass);
        assert!(manifest.detail.as_deref().unwrap().contains("2.4.0"));
    }
}
