//! # Remediation Repository
//!
//! Persistence for the remediation request queue: creation, the poll that
//! transitions `pending → delivered`, result posting, and the TTL sweep
//! that re-pends deliveries the node never answered.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use warden_core::{FleetError, RemediationRequest, RemediationStatus};

use crate::{internal, parse_id, FleetStore};

const REMEDIATION_COLUMNS: &str =
    "id, node_id, actions, dry_run, status, created_at, delivered_at, completed_at, result";

impl FleetStore {
    /// Create a `pending` request for `node_id`. The node must exist and
    /// `actions` must be non-empty.
    pub async fn create_remediation(
        &self,
        node_id: Uuid,
        actions: Vec<String>,
        dry_run: bool,
    ) -> Result<RemediationRequest, FleetError> {
        if actions.is_empty() {
            return Err(FleetError::BadRequest(
                "actions must be a non-empty list".into(),
            ));
        }
        // Surfaces NotFound before we touch the remediations table.
        self.get_node(node_id).await?;

        let request = RemediationRequest {
            id: Uuid::new_v4(),
            node_id,
            actions,
            dry_run,
            status: RemediationStatus::Pending,
            created_at: Utc::now(),
            delivered_at: None,
            completed_at: None,
            result: None,
        };

        let actions_json = serde_json::to_string(&request.actions)
            .map_err(|e| FleetError::Internal(format!("encode actions: {e}")))?;

        sqlx::query(
            "INSERT INTO remediations (id, node_id, actions, dry_run, status, created_at)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
        )
        .bind(request.id.to_string())
        .bind(request.node_id.to_string())
        .bind(actions_json)
        .bind(request.dry_run)
        .bind(request.created_at)
        .execute(self.pool())
        .await
        .map_err(internal)?;

        Ok(request)
    }

    /// Fetch one request by id.
    pub async fn get_remediation(&self, id: Uuid) -> Result<RemediationRequest, FleetError> {
        let row = sqlx::query_as::<_, RemediationRow>(&format!(
            "SELECT {REMEDIATION_COLUMNS} FROM remediations WHERE id = ?1"
        ))
        .bind(id.to_string())
        .fetch_optional(self.pool())
        .await
        .map_err(internal)?;

        row.map(RemediationRow::into_record)
            .transpose()?
            .ok_or_else(|| FleetError::not_found("remediation request", id))
    }

    /// Return every open (`pending` or `delivered`) request for the node,
    /// transitioning `pending` rows to `delivered` in the same transaction.
    /// A stuck `delivered` request keeps appearing on every poll until the
    /// node posts its result.
    pub async fn poll_remediations(
        &self,
        node_id: Uuid,
    ) -> Result<Vec<RemediationRequest>, FleetError> {
        let now = Utc::now();
        let mut tx = self.pool().begin().await.map_err(internal)?;

        sqlx::query(
            "UPDATE remediations SET status = 'delivered', delivered_at = ?1
             WHERE node_id = ?2 AND status = 'pending'",
        )
        .bind(now)
        .bind(node_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(internal)?;

        let rows = sqlx::query_as::<_, RemediationRow>(&format!(
            "SELECT {REMEDIATION_COLUMNS} FROM remediations
             WHERE node_id = ?1 AND status = 'delivered'
             ORDER BY created_at"
        ))
        .bind(node_id.to_string())
        .fetch_all(&mut *tx)
        .await
        .map_err(internal)?;

        tx.commit().await.map_err(internal)?;
        rows.into_iter().map(RemediationRow::into_record).collect()
    }

    /// Record the node's result for a request it owns.
    ///
    /// `caller` must match the request's `node_id` (`Forbidden` otherwise,
    /// with no state change). Posting to an already-terminal request is a
    /// `Conflict`.
    pub async fn complete_remediation(
        &self,
        id: Uuid,
        caller: Uuid,
        result: serde_json::Value,
        success: bool,
    ) -> Result<RemediationRequest, FleetError> {
        let request = self.get_remediation(id).await?;
        if request.node_id != caller {
            return Err(FleetError::Forbidden(
                "remediation request belongs to another node".into(),
            ));
        }
        if !request.status.is_open() {
            return Err(FleetError::Conflict(format!(
                "remediation request already {}",
                request.status
            )));
        }

        let status = if success {
            RemediationStatus::Completed
        } else {
            RemediationStatus::Failed
        };
        let result_text = serde_json::to_string(&result)
            .map_err(|e| FleetError::Internal(format!("encode result: {e}")))?;

        let row = sqlx::query_as::<_, RemediationRow>(&format!(
            "UPDATE remediations SET status = ?1, completed_at = ?2, result = ?3
             WHERE id = ?4 AND node_id = ?5 AND status IN ('pending', 'delivered')
             RETURNING {REMEDIATION_COLUMNS}"
        ))
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(result_text)
        .bind(id.to_string())
        .bind(caller.to_string())
        .fetch_optional(self.pool())
        .await
        .map_err(internal)?;

        // The guarded UPDATE re-checks ownership and openness, so a racing
        // second result post lands here as Conflict.
        row.map(RemediationRow::into_record)
            .transpose()?
            .ok_or_else(|| {
                FleetError::Conflict("remediation request no longer open".into())
            })
    }

    /// Re-pend every `delivered` request older than `cutoff`. Returns how
    /// many were reverted.
    pub async fn revert_stale_deliveries(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, FleetError> {
        let result = sqlx::query(
            "UPDATE remediations SET status = 'pending', delivered_at = NULL
             WHERE status = 'delivered' AND delivered_at < ?1",
        )
        .bind(cutoff)
        .execute(self.pool())
        .await
        .map_err(internal)?;

        Ok(result.rows_affected())
    }
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct RemediationRow {
    id: String,
    node_id: String,
    actions: String,
    dry_run: bool,
    status: String,
    created_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    result: Option<String>,
}

impl RemediationRow {
    fn into_record(self) -> Result<RemediationRequest, FleetError> {
        let status = RemediationStatus::parse(&self.status).unwrap_or_else(|| {
            tracing::warn!(id = %self.id, status = %self.status, "unknown remediation status in database, defaulting to failed");
            RemediationStatus::Failed
        });

        let actions: Vec<String> = serde_json::from_str(&self.actions)
            .map_err(|e| FleetError::Internal(format!("corrupt actions column: {e}")))?;

        let result = match self.result {
            Some(raw) => Some(
                serde_json::from_str(&raw)
                    .map_err(|e| FleetError::Internal(format!("corrupt result column: {e}")))?,
            ),
            None => None,
        };

        Ok(RemediationRequest {
            id: parse_id(&self.id)?,
            node_id: parse_id(&self.node_id)?,
            actions,
            dry_run: self.dry_run,
            status,
            created_at: self.created_at,
            delivered_at: self.delivered_at,
            completed_at: self.completed_at,
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NewNode, NewToken};
    use serde_json::json;
    use warden_core::{Node, NodeRole};

    async fn two_nodes() -> (FleetStore, Node, Node) {
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
        let new = |name: &str| NewNode {
            name: name.into(),
            role: NodeRole::Server,
            region: None,
            version: "1.0.0".into(),
            fips_backend: "openssl-fips".into(),
            service: None,
        };
        let (n, _) = store.enroll_node(&token, new("n")).await.unwrap();
        let (m, _) = store.enroll_node(&token, new("m")).await.unwrap();
        (store, n, m)
    }

    #[tokio::test]
    async fn poll_delivers_once_per_request() {
        let (store, n, m) = two_nodes().await;
        let request = store
            .create_remediation(n.id, vec!["enable_os_fips".into()], false)
            .await
            .unwrap();
        assert_eq!(request.status, RemediationStatus::Pending);

        // Target node sees it, now delivered.
        let delivered = store.poll_remediations(n.id).await.unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].status, RemediationStatus::Delivered);
        assert!(delivered[0].delivered_at.is_some());

        // Another node sees nothing.
        assert!(store.poll_remediations(m.id).await.unwrap().is_empty());

        // Still offered to the owner until a result arrives.
        assert_eq!(store.poll_remediations(n.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn complete_closes_request() {
        let (store, n, _) = two_nodes().await;
        let request = store
            .create_remediation(n.id, vec!["enable_os_fips".into()], false)
            .await
            .unwrap();
        store.poll_remediations(n.id).await.unwrap();

        let done = store
            .complete_remediation(request.id, n.id, json!({"ok": true}), true)
            .await
            .unwrap();
        assert_eq!(done.status, RemediationStatus::Completed);
        assert!(done.completed_at.is_some());

        // No longer offered.
        assert!(store.poll_remediations(n.id).await.unwrap().is_empty());

        // Second post conflicts.
        let err = store
            .complete_remediation(request.id, n.id, json!({}), true)
            .await
            .expect_err("already terminal");
        assert!(matches!(err, FleetError::Conflict(_)));
    }

    #[tokio::test]
    async fn foreign_result_post_is_forbidden_and_harmless() {
        let (store, n, m) = two_nodes().await;
        let request = store
            .create_remediation(n.id, vec!["rotate_certs".into()], true)
            .await
            .unwrap();

        let err = store
            .complete_remediation(request.id, m.id, json!({}), true)
            .await
            .expect_err("wrong owner");
        assert!(matches!(err, FleetError::Forbidden(_)));

        let untouched = store.get_remediation(request.id).await.unwrap();
        assert_eq!(untouched.status, RemediationStatus::Pending);
        assert!(untouched.result.is_none());
    }

    #[tokio::test]
    async fn failed_result_marks_failed() {
        let (store, n, _) = two_nodes().await;
        let request = store
            .create_remediation(n.id, vec!["enable_os_fips".into()], false)
            .await
            .unwrap();

        let done = store
            .complete_remediation(request.id, n.id, json!({"error": "no tpm"}), false)
            .await
            .unwrap();
        assert_eq!(done.status, RemediationStatus::Failed);
    }

    #[tokio::test]
    async fn empty_actions_rejected() {
        let (store, n, _) = two_nodes().await;
        let err = store
            .create_remediation(n.id, vec![], false)
            .await
            .expect_err("empty actions");
        assert!(matches!(err, FleetError::BadRequest(_)));
    }

    #[tokio::test]
    async fn missing_node_rejected() {
        let (store, _, _) = two_nodes().await;
        let err = store
            .create_remediation(Uuid::new_v4(), vec!["x".into()], false)
            .await
            .expect_err("node absent");
        assert!(matches!(err, FleetError::NotFound(_)));
    }

    #[tokio::test]
    async fn stale_delivery_reverts_to_pending() {
        let (store, n, _) = two_nodes().await;
        store
            .create_remediation(n.id, vec!["enable_os_fips".into()], false)
            .await
            .unwrap();
        store.poll_remediations(n.id).await.unwrap();

        // Nothing is stale yet.
        let cutoff = Utc::now() - chrono::Duration::minutes(15);
        assert_eq!(store.revert_stale_deliveries(cutoff).await.unwrap(), 0);

        // With the cutoff in the future everything delivered is stale.
        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        assert_eq!(store.revert_stale_deliveries(cutoff).await.unwrap(), 1);

        let reverted = store.poll_remediations(n.id).await.unwrap();
        assert_eq!(reverted.len(), 1);
        assert_eq!(reverted[0].status, RemediationStatus::Delivered);
    }
}
