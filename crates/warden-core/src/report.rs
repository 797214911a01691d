//! # Compliance Reports — Opaque Documents, Typed Projection
//!
//! Nodes submit compliance reports as arbitrary JSON. The controller
//! persists the raw document and reads it through the typed projection
//! defined here: summary counts, sections of items, and a name-indexed
//! lookup over the handful of well-known check names the policy engine
//! consults.
//!
//! Deserialization is deliberately tolerant: unknown fields are ignored and
//! missing sections default to empty, so an agent running a newer report
//! schema still ingests cleanly.

use serde::{Deserialize, Serialize};

/// Outcome of a single compliance check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    Warning,
    Unknown,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Warning => "warning",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for CheckStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

/// How a check's verdict was obtained. Carried on items the controller
/// produces itself (the aggregator) so consumers can weigh the evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    /// Observed directly on the controller host.
    Direct,
    /// Read from a remote configuration API.
    Api,
    /// Derived from passive network observation.
    Probe,
    /// Inherited from a platform or upstream attestation.
    Inherited,
    /// Self-reported by an agent; not independently verified.
    Reported,
}

/// One compliance check result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: CheckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_method: Option<VerificationMethod>,
}

impl ReportItem {
    /// A passing item with no extra annotations.
    pub fn pass(id: &str, name: &str) -> Self {
        Self::with_status(id, name, CheckStatus::Pass)
    }

    /// An item with the given status and no annotations.
    pub fn with_status(id: &str, name: &str, status: CheckStatus) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            status,
            severity: None,
            detail: None,
            remediation: None,
            verification_method: None,
        }
    }

    /// Attach a human-readable detail string.
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attach a remediation hint.
    pub fn remediation(mut self, hint: impl Into<String>) -> Self {
        self.remediation = Some(hint.into());
        self
    }

    /// Tag how the verdict was obtained.
    pub fn method(mut self, method: VerificationMethod) -> Self {
        self.verification_method = Some(method);
        self
    }

    /// Tag the severity label.
    pub fn severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = Some(severity.into());
        self
    }
}

/// A named group of check items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSection {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub items: Vec<ReportItem>,
}

/// Pass/fail/warning counts over an entire report. Denormalized onto the
/// node row by the store for cheap listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    #[serde(default)]
    pub passed: i64,
    #[serde(default)]
    pub failed: i64,
    #[serde(default)]
    pub warnings: i64,
    #[serde(default)]
    pub total: i64,
}

impl ReportSummary {
    /// Recompute counts from a list of sections. Used by the aggregator;
    /// node-submitted summaries are taken as-is.
    pub fn tally(sections: &[ReportSection]) -> Self {
        let mut summary = Self::default();
        for item in sections.iter().flat_map(|s| &s.items) {
            summary.total += 1;
            match item.status {
                CheckStatus::Pass => summary.passed += 1,
                CheckStatus::Fail => summary.failed += 1,
                CheckStatus::Warning => summary.warnings += 1,
                CheckStatus::Unknown => {}
            }
        }
        summary
    }
}

/// Typed projection of a compliance report document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComplianceReport {
    #[serde(default)]
    pub summary: ReportSummary,
    #[serde(default)]
    pub sections: Vec<ReportSection>,
}

impl ComplianceReport {
    /// Project the typed view out of an opaque report document.
    ///
    /// Unknown fields are dropped; a document without `summary` or
    /// `sections` projects to empty defaults rather than failing, per the
    /// tolerant-ingest rule.
    pub fn from_value(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    /// Find a check item by its well-known `name`, searching all sections.
    /// Names are compared case-insensitively; agents disagree on casing.
    pub fn find_item(&self, name: &str) -> Option<&ReportItem> {
        self.sections
            .iter()
            .flat_map(|s| &s.items)
            .find(|item| item.name.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_report() -> serde_json::Value {
        json!({
            "summary": {"passed": 5, "failed": 1, "warnings": 0, "total": 6},
            "sections": [
                {
                    "id": "crypto",
                    "name": "Cryptographic Posture",
                    "items": [
                        {"id": "c1", "name": "FIPS backend active", "status": "pass"},
                        {"id": "c2", "name": "Disk encryption", "status": "fail",
                         "severity": "high", "remediation": "enable LUKS"}
                    ]
                },
                {
                    "id": "os",
                    "name": "Operating System",
                    "items": [
                        {"id": "o1", "name": "OS FIPS mode", "status": "pass"}
                    ]
                }
            ],
            "extra_field_from_newer_agent": {"ignored": true}
        })
    }

    #[test]
    fn projects_summary_and_sections() {
        let report = ComplianceReport::from_value(&sample_report());
        assert_eq!(report.summary.passed, 5);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.sections.len(), 2);
    }

    #[test]
    fn find_item_searches_across_sections() {
        let report = ComplianceReport::from_value(&sample_report());
        let item = report.find_item("OS FIPS mode").expect("item present");
        assert_eq!(item.status, CheckStatus::Pass);

        let disk = report.find_item("disk encryption").expect("case-insensitive");
        assert_eq!(disk.status, CheckStatus::Fail);

        assert!(report.find_item("No such check").is_none());
    }

    #[test]
    fn degenerate_documents_project_to_defaults() {
        for doc in [json!({}), json!(null), json!([1, 2, 3]), json!("text")] {
            let report = ComplianceReport::from_value(&doc);
            assert_eq!(report.summary, ReportSummary::default());
            assert!(report.sections.is_empty());
        }
    }

    #[test]
    fn unknown_status_string_defaults() {
        let doc = json!({
            "sections": [{"id": "s", "name": "s", "items": [
                {"id": "i", "name": "weird", "status": "exploded"}
            ]}]
        });
        // A single unparseable item status fails that item's deserialization,
        // which collapses the whole projection to defaults rather than
        // erroring the ingest path.
        let report = ComplianceReport::from_value(&doc);
        assert!(report.find_item("weird").is_none());
    }

    #[test]
    fn tally_counts_each_status() {
        let sections = vec![ReportSection {
            id: "s".into(),
            name: "s".into(),
            items: vec![
                ReportItem::pass("a", "a"),
                ReportItem::with_status("b", "b", CheckStatus::Fail),
                ReportItem::with_status("c", "c", CheckStatus::Warning),
                ReportItem::with_status("d", "d", CheckStatus::Unknown),
            ],
        }];
        let summary = ReportSummary::tally(&sections);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.warnings, 1);
        assert_eq!(summary.total, 4);
    }
}
