//! # Report Storage
//!
//! The latest compliance report per node, stored as an opaque JSON blob.
//! A new report fully shadows the previous one; summary counts, heartbeat,
//! and the derived liveness status are denormalized onto the node row in the
//! same transaction so listings never need to touch the blob.

use chrono::Utc;
use uuid::Uuid;

use warden_core::{FleetError, Node, NodeStatus, ReportSummary};

use crate::nodes::{encode_json, NodeRow};
use crate::{internal, FleetStore};

impl FleetStore {
    /// Persist `body` as the node's latest report, denormalize the summary,
    /// touch the heartbeat, and set the liveness status. Returns the updated
    /// node so the caller can evaluate policy and emit its event afterwards.
    pub async fn store_report(
        &self,
        node_id: Uuid,
        body: &serde_json::Value,
        summary: ReportSummary,
        status: NodeStatus,
    ) -> Result<Node, FleetError> {
        let now = Utc::now();
        let body_text = serde_json::to_string(body)
            .map_err(|e| FleetError::Internal(format!("encode report body: {e}")))?;
        let summary_json = encode_json(Some(&summary))?;

        let mut tx = self.pool().begin().await.map_err(internal)?;

        let updated = sqlx::query_as::<_, NodeRow>(
            "UPDATE nodes
             SET report_summary = ?1, last_heartbeat_at = ?2, status = ?3
             WHERE id = ?4
             RETURNING id, name, role, region, version, fips_backend, status,
                       compliance_status, last_heartbeat_at, report_summary, service, created_at",
        )
        .bind(summary_json)
        .bind(now)
        .bind(status.as_str())
        .bind(node_id.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(internal)?;

        let Some(row) = updated else {
            return Err(FleetError::not_found("node", node_id));
        };

        sqlx::query(
            "INSERT INTO reports (node_id, body, received_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(node_id) DO UPDATE SET body = ?2, received_at = ?3",
        )
        .bind(node_id.to_string())
        .bind(body_text)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(internal)?;

        tx.commit().await.map_err(internal)?;
        row.into_record()
    }

    /// Fetch the node's latest raw report document, if it has ever reported.
    pub async fn latest_report(
        &self,
        node_id: Uuid,
    ) -> Result<Option<serde_json::Value>, FleetError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT body FROM reports WHERE node_id = ?1")
                .bind(node_id.to_string())
                .fetch_optional(self.pool())
                .await
                .map_err(internal)?;

        row.map(|(body,)| {
            serde_json::from_str(&body)
                .map_err(|e| FleetError::Internal(format!("corrupt report body: {e}")))
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NewNode, NewToken};
    use serde_json::json;
    use warden_core::NodeRole;

    async fn enrolled_store() -> (FleetStore, Node) {
        let store = FleetStore::open_in_memory().await.unwrap();
        let (token, _) = store
            .create_token(NewToken {
                role: None,
                region: None,
                max_uses: 0,
                expires_at: None,
            })
            .await
            .unwrap();
        let (node, _) = store
            .enroll_node(
                &token,
                NewNode {
                    name: "s1".into(),
                    role: NodeRole::Server,
                    region: None,
                    version: "1.0.0".into(),
                    fips_backend: "openssl-fips".into(),
                    service: None,
                },
            )
            .await
            .unwrap();
        (store, node)
    }

    #[tokio::test]
    async fn report_denormalizes_summary_and_status() {
        let (store, node) = enrolled_store().await;
        let body = json!({"summary": {"passed": 4, "failed": 1, "warnings": 0, "total": 5}});
        let summary = ReportSummary {
            passed: 4,
            failed: 1,
            warnings: 0,
            total: 5,
        };

        let updated = store
            .store_report(node.id, &body, summary, NodeStatus::Degraded)
            .await
            .unwrap();
        assert_eq!(updated.status, NodeStatus::Degraded);
        assert_eq!(updated.report_summary, Some(summary));
        assert!(updated.last_heartbeat_at >= node.last_heartbeat_at);
    }

    #[tokio::test]
    async fn latest_report_shadows_previous() {
        let (store, node) = enrolled_store().await;
        let first = json!({"summary": {"passed": 1, "failed": 0, "warnings": 0, "total": 1}, "marker": "first"});
        let second = json!({"summary": {"passed": 2, "failed": 0, "warnings": 0, "total": 2}, "marker": "second"});

        for body in [&first, &second] {
            store
                .store_report(node.id, body, ReportSummary::default(), NodeStatus::Online)
                .await
                .unwrap();
        }

        let latest = store.latest_report(node.id).await.unwrap().unwrap();
        assert_eq!(latest["marker"], "second");
    }

    #[tokio::test]
    async fn no_report_yet_is_none() {
        let (store, node) = enrolled_store().await;
        assert!(store.latest_report(node.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_node_cascades_report() {
        let (store, node) = enrolled_store().await;
        store
            .store_report(
                node.id,
                &json!({}),
                ReportSummary::default(),
                NodeStatus::Online,
            )
            .await
            .unwrap();

        store.delete_node(node.id).await.unwrap();
        assert!(store.latest_report(node.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn report_for_missing_node_is_not_found() {
        let store = FleetStore::open_in_memory().await.unwrap();
        let err = store
            .store_report(
                Uuid::new_v4(),
                &json!({}),
                ReportSummary::default(),
                NodeStatus::Online,
            )
            .await
            .expect_err("no such node");
        assert!(matches!(err, FleetError::NotFound(_)));
    }
}
