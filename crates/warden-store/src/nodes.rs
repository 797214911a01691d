//! # Node Repository
//!
//! Node lifecycle persistence: the enroll transaction (atomic token consume
//! plus node insert), lookups, filtered listing, status updates, the fleet
//! summary, and the staleness sweep.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use warden_core::{
    ComplianceStatus, EnrollmentToken, FleetError, FleetSummary, Node, NodeRole, NodeStatus,
    ReportSummary, ServiceRegistration,
};

use crate::secret::{generate_secret, hash_secret};
use crate::tokens::TokenRow;
use crate::{internal, parse_id, FleetStore};

/// Parameters for node creation, resolved by the enrollment service from
/// the request plus the token's pinned role/region.
#[derive(Debug, Clone)]
pub struct NewNode {
    pub name: String,
    pub role: NodeRole,
    pub region: Option<String>,
    pub version: String,
    pub fips_backend: String,
    pub service: Option<ServiceRegistration>,
}

/// Optional filters for node listing. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    pub role: Option<NodeRole>,
    pub region: Option<String>,
    pub status: Option<NodeStatus>,
}

const NODE_COLUMNS: &str = "id, name, role, region, version, fips_backend, status, \
     compliance_status, last_heartbeat_at, report_summary, service, created_at";

impl FleetStore {
    /// Consume one use of `token` and create a node, atomically.
    ///
    /// The guarded token update is the transaction's first statement, so the
    /// write lock is held for the whole enroll and two racing requests on a
    /// one-use token serialize: the second sees zero rows affected and gets
    /// `TokenExhausted` (or `TokenExpired`). Returns the node and its
    /// plaintext API key; the key is not recoverable afterwards.
    pub async fn enroll_node(
        &self,
        token: &EnrollmentToken,
        new: NewNode,
    ) -> Result<(Node, String), FleetError> {
        let now = Utc::now();
        let mut tx = self.pool().begin().await.map_err(internal)?;

        let consumed = sqlx::query(
            "UPDATE tokens SET uses_so_far = uses_so_far + 1
             WHERE id = ?1
               AND (max_uses = 0 OR uses_so_far < max_uses)
               AND (expires_at IS NULL OR expires_at > ?2)",
        )
        .bind(token.id.to_string())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(internal)?;

        if consumed.rows_affected() == 0 {
            // Distinguish why the guard failed; the transaction has changed
            // nothing, so a plain rollback-on-drop is fine.
            let row = sqlx::query_as::<_, TokenRow>(
                "SELECT id, secret_hash, role, region, max_uses, uses_so_far, expires_at, created_at
                 FROM tokens WHERE id = ?1",
            )
            .bind(token.id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(internal)?;

            return Err(match row {
                None => FleetError::InvalidCredentials,
                Some(row) => {
                    let record = row.into_record()?;
                    if record.is_expired(now) {
                        FleetError::TokenExpired
                    } else {
                        FleetError::TokenExhausted
                    }
                }
            });
        }

        let api_key = generate_secret();
        let node = Node {
            id: Uuid::new_v4(),
            name: new.name,
            role: new.role,
            region: new.region,
            version: new.version,
            fips_backend: new.fips_backend,
            status: NodeStatus::Online,
            compliance_status: ComplianceStatus::Unknown,
            last_heartbeat_at: now,
            report_summary: None,
            service: new.service,
            created_at: now,
        };

        let service_json = encode_json(node.service.as_ref())?;
        sqlx::query(
            "INSERT INTO nodes (id, name, role, region, version, fips_backend, status,
                                compliance_status, last_heartbeat_at, api_key_hash,
                                report_summary, service, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, NULL, ?11, ?12)",
        )
        .bind(node.id.to_string())
        .bind(&node.name)
        .bind(node.role.as_str())
        .bind(&node.region)
        .bind(&node.version)
        .bind(&node.fips_backend)
        .bind(node.status.as_str())
        .bind(node.compliance_status.as_str())
        .bind(node.last_heartbeat_at)
        .bind(hash_secret(&api_key))
        .bind(service_json)
        .bind(node.created_at)
        .execute(&mut *tx)
        .await
        .map_err(internal)?;

        tx.commit().await.map_err(internal)?;
        Ok((node, api_key))
    }

    /// Fetch a node by id.
    pub async fn get_node(&self, id: Uuid) -> Result<Node, FleetError> {
        let row = sqlx::query_as::<_, NodeRow>(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?1"
        ))
        .bind(id.to_string())
        .fetch_optional(self.pool())
        .await
        .map_err(internal)?;

        row.map(NodeRow::into_record)
            .transpose()?
            .ok_or_else(|| FleetError::not_found("node", id))
    }

    /// Resolve a node by its API-key hash. `None` means the key is unknown;
    /// the HTTP layer turns that into `InvalidCredentials`.
    pub async fn node_by_api_key_hash(
        &self,
        api_key_hash: &str,
    ) -> Result<Option<Node>, FleetError> {
        let row = sqlx::query_as::<_, NodeRow>(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE api_key_hash = ?1"
        ))
        .bind(api_key_hash)
        .fetch_optional(self.pool())
        .await
        .map_err(internal)?;

        row.map(NodeRow::into_record).transpose()
    }

    /// List nodes matching the filter, oldest first.
    pub async fn list_nodes(&self, filter: &NodeFilter) -> Result<Vec<Node>, FleetError> {
        let rows = sqlx::query_as::<_, NodeRow>(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes
             WHERE (?1 IS NULL OR role = ?1)
               AND (?2 IS NULL OR region = ?2)
               AND (?3 IS NULL OR status = ?3)
             ORDER BY created_at"
        ))
        .bind(filter.role.map(|r| r.as_str().to_string()))
        .bind(&filter.region)
        .bind(filter.status.map(|s| s.as_str().to_string()))
        .fetch_all(self.pool())
        .await
        .map_err(internal)?;

        rows.into_iter().map(NodeRow::into_record).collect()
    }

    /// Delete a node. Its report and remediation requests cascade.
    pub async fn delete_node(&self, id: Uuid) -> Result<(), FleetError> {
        let result = sqlx::query("DELETE FROM nodes WHERE id = ?1")
            .bind(id.to_string())
            .execute(self.pool())
            .await
            .map_err(internal)?;

        if result.rows_affected() == 0 {
            return Err(FleetError::not_found("node", id));
        }
        Ok(())
    }

    /// Touch the node's heartbeat timestamp. No other field changes.
    pub async fn update_heartbeat(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), FleetError> {
        let result = sqlx::query("UPDATE nodes SET last_heartbeat_at = ?1 WHERE id = ?2")
            .bind(at)
            .bind(id.to_string())
            .execute(self.pool())
            .await
            .map_err(internal)?;

        if result.rows_affected() == 0 {
            return Err(FleetError::not_found("node", id));
        }
        Ok(())
    }

    /// Record the derived compliance status and return the updated node.
    pub async fn set_compliance_status(
        &self,
        id: Uuid,
        status: ComplianceStatus,
    ) -> Result<Node, FleetError> {
        let row = sqlx::query_as::<_, NodeRow>(&format!(
            "UPDATE nodes SET compliance_status = ?1 WHERE id = ?2 RETURNING {NODE_COLUMNS}"
        ))
        .bind(status.as_str())
        .bind(id.to_string())
        .fetch_optional(self.pool())
        .await
        .map_err(internal)?;

        row.map(NodeRow::into_record)
            .transpose()?
            .ok_or_else(|| FleetError::not_found("node", id))
    }

    /// Aggregate counts per role, status, and compliance status.
    pub async fn fleet_summary(&self) -> Result<FleetSummary, FleetError> {
        let rows = sqlx::query_as::<_, (String, String, String)>(
            "SELECT role, status, compliance_status FROM nodes",
        )
        .fetch_all(self.pool())
        .await
        .map_err(internal)?;

        let mut summary = FleetSummary::default();
        for (role, status, compliance) in rows {
            summary.total += 1;
            *summary.by_role.entry(role).or_insert(0) += 1;
            *summary.by_status.entry(status).or_insert(0) += 1;
            *summary.by_compliance.entry(compliance).or_insert(0) += 1;
        }
        Ok(summary)
    }

    /// Transition every node whose heartbeat predates `cutoff` to `offline`
    /// and return the transitioned nodes so the caller can emit events.
    pub async fn mark_stale_offline(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Node>, FleetError> {
        let rows = sqlx::query_as::<_, NodeRow>(&format!(
            "UPDATE nodes SET status = 'offline'
             WHERE status != 'offline' AND last_heartbeat_at < ?1
             RETURNING {NODE_COLUMNS}"
        ))
        .bind(cutoff)
        .fetch_all(self.pool())
        .await
        .map_err(internal)?;

        rows.into_iter().map(NodeRow::into_record).collect()
    }
}

pub(crate) fn encode_json<T: serde::Serialize>(
    value: Option<&T>,
) -> Result<Option<String>, FleetError> {
    value
        .map(|v| {
            serde_json::to_string(v)
                .map_err(|e| FleetError::Internal(format!("encode json column: {e}")))
        })
        .transpose()
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
pub(crate) struct NodeRow {
    id: String,
    name: String,
    role: String,
    region: Option<String>,
    version: String,
    fips_backend: String,
    status: String,
    compliance_status: String,
    last_heartbeat_at: DateTime<Utc>,
    report_summary: Option<String>,
    service: Option<String>,
    created_at: DateTime<Utc>,
}

impl NodeRow {
    pub(crate) fn into_record(self) -> Result<Node, FleetError> {
        let role = NodeRole::parse(&self.role).unwrap_or_else(|| {
            tracing::warn!(id = %self.id, role = %self.role, "unknown node role in database, defaulting to client");
            NodeRole::Client
        });
        let status = NodeStatus::parse(&self.status).unwrap_or_else(|| {
            tracing::warn!(id = %self.id, status = %self.status, "unknown node status in database, defaulting to offline");
            NodeStatus::Offline
        });
        let compliance_status =
            ComplianceStatus::parse(&self.compliance_status).unwrap_or_else(|| {
                tracing::warn!(id = %self.id, status = %self.compliance_status, "unknown compliance status in database, defaulting to unknown");
                ComplianceStatus::Unknown
            });

        let report_summary: Option<ReportSummary> =
            decode_json(self.report_summary.as_deref(), &self.id, "report_summary");
        let service: Option<ServiceRegistration> =
            decode_json(self.service.as_deref(), &self.id, "service");

        Ok(Node {
            id: parse_id(&self.id)?,
            name: self.name,
            role,
            region: self.region,
            version: self.version,
            fips_backend: self.fips_backend,
            status,
            compliance_status,
            last_heartbeat_at: self.last_heartbeat_at,
            report_summary,
            service,
            created_at: self.created_at,
        })
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(
    raw: Option<&str>,
    id: &str,
    column: &str,
) -> Option<T> {
    let raw = raw?;
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(id = %id, column, error = %e, "corrupt json column, treating as absent");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NewToken;

    async fn store_with_token(max_uses: i64) -> (FleetStore, EnrollmentToken) {
        let store = FleetStore::open_in_memory().await.unwrap();
        let (token, _) = store
            .create_token(NewToken {
                role: Some(NodeRole::Server),
                region: None,
                max_uses,
                expires_at: None,
            })
            .await
            .unwrap();
        (store, token)
    }

    fn server(name: &str) -> NewNode {
        NewNode {
            name: name.into(),
            role: NodeRole::Server,
            region: None,
            version: "1.2.0".into(),
            fips_backend: "openssl-fips".into(),
            service: Some(ServiceRegistration {
                host: "10.0.0.1".into(),
                port: 443,
                tls: true,
            }),
        }
    }

    #[tokio::test]
    async fn enroll_creates_online_unknown_node() {
        let (store, token) = store_with_token(1).await;
        let (node, api_key) = store.enroll_node(&token, server("s1")).await.unwrap();

        assert_eq!(node.status, NodeStatus::Online);
        assert_eq!(node.compliance_status, ComplianceStatus::Unknown);
        assert_eq!(api_key.len(), 64);

        let fetched = store.get_node(node.id).await.unwrap();
        assert_eq!(fetched.name, "s1");
        assert_eq!(fetched.service.as_ref().unwrap().port, 443);
    }

    #[tokio::test]
    async fn one_use_token_exhausts_on_second_enroll() {
        let (store, token) = store_with_token(1).await;
        store.enroll_node(&token, server("s1")).await.unwrap();

        let err = store
            .enroll_node(&token, server("s2"))
            .await
            .expect_err("token is spent");
        assert!(matches!(err, FleetError::TokenExhausted));
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let store = FleetStore::open_in_memory().await.unwrap();
        let (token, _) = store
            .create_token(NewToken {
                role: None,
                region: None,
                max_uses: 0,
                expires_at: Some(Utc::now() - chrono::Duration::minutes(1)),
            })
            .await
            .unwrap();

        let err = store
            .enroll_node(&token, server("s1"))
            .await
            .expect_err("token expired");
        assert!(matches!(err, FleetError::TokenExpired));
    }

    #[tokio::test]
    async fn api_key_resolves_node() {
        let (store, token) = store_with_token(0).await;
        let (node, api_key) = store.enroll_node(&token, server("s1")).await.unwrap();

        let hash = crate::secret::hash_secret(&api_key);
        let resolved = store.node_by_api_key_hash(&hash).await.unwrap().unwrap();
        assert_eq!(resolved.id, node.id);

        let miss = store
            .node_by_api_key_hash(&crate::secret::hash_secret("wrong"))
            .await
            .unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn list_nodes_filters_compose() {
        let (store, token) = store_with_token(0).await;
        store.enroll_node(&token, server("a")).await.unwrap();
        let mut proxy = server("b");
        proxy.role = NodeRole::Proxy;
        proxy.region = Some("us-east".into());
        store.enroll_node(&token, proxy).await.unwrap();

        let all = store.list_nodes(&NodeFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let servers = store
            .list_nodes(&NodeFilter {
                role: Some(NodeRole::Server),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].name, "a");

        let east_proxies = store
            .list_nodes(&NodeFilter {
                role: Some(NodeRole::Proxy),
                region: Some("us-east".into()),
                status: Some(NodeStatus::Online),
            })
            .await
            .unwrap();
        assert_eq!(east_proxies.len(), 1);

        let none = store
            .list_nodes(&NodeFilter {
                region: Some("mars".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn heartbeat_updates_only_timestamp() {
        let (store, token) = store_with_token(0).await;
        let (node, _) = store.enroll_node(&token, server("s1")).await.unwrap();

        let later = Utc::now() + chrono::Duration::seconds(30);
        store.update_heartbeat(node.id, later).await.unwrap();

        let fetched = store.get_node(node.id).await.unwrap();
        assert_eq!(fetched.last_heartbeat_at, later);
        assert_eq!(fetched.status, NodeStatus::Online);
        assert_eq!(fetched.compliance_status, ComplianceStatus::Unknown);
    }

    #[tokio::test]
    async fn stale_sweep_transitions_and_returns_nodes() {
        let (store, token) = store_with_token(0).await;
        let (stale, _) = store.enroll_node(&token, server("stale")).await.unwrap();
        let (fresh, _) = store.enroll_node(&token, server("fresh")).await.unwrap();

        store
            .update_heartbeat(stale.id, Utc::now() - chrono::Duration::minutes(10))
            .await
            .unwrap();

        let cutoff = Utc::now() - chrono::Duration::seconds(180);
        let swept = store.mark_stale_offline(cutoff).await.unwrap();
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].id, stale.id);
        assert_eq!(swept[0].status, NodeStatus::Offline);

        // Second sweep is a no-op: already offline.
        assert!(store.mark_stale_offline(cutoff).await.unwrap().is_empty());

        let fresh_node = store.get_node(fresh.id).await.unwrap();
        assert_eq!(fresh_node.status, NodeStatus::Online);
    }

    #[tokio::test]
    async fn concurrent_enrolls_respect_max_uses() {
        // File-backed store so enrolls really contend for the write lock.
        let dir = tempfile::tempdir().unwrap();
        let store = FleetStore::open(&dir.path().join("fleet.db")).await.unwrap();
        let (token, _) = store
            .create_token(NewToken {
                role: None,
                region: None,
                max_uses: 3,
                expires_at: None,
            })
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            let token = token.clone();
            tasks.push(tokio::spawn(async move {
                store.enroll_node(&token, server(&format!("n{i}"))).await
            }));
        }

        let mut ok = 0;
        let mut exhausted = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => ok += 1,
                Err(FleetError::TokenExhausted) => exhausted += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(ok, 3);
        assert_eq!(exhausted, 5);

        let nodes = store.list_nodes(&NodeFilter::default()).await.unwrap();
        assert_eq!(nodes.len(), 3);
    }

    #[tokio::test]
    async fn fleet_summary_counts_axes() {
        let (store, token) = store_with_token(0).await;
        store.enroll_node(&token, server("a")).await.unwrap();
        let (b, _) = store.enroll_node(&token, server("b")).await.unwrap();
        store
            .set_compliance_status(b.id, ComplianceStatus::Compliant)
            .await
            .unwrap();

        let summary = store.fleet_summary().await.unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.by_role.get("server"), Some(&2));
        assert_eq!(summary.by_status.get("online"), Some(&2));
        assert_eq!(summary.by_compliance.get("compliant"), Some(&1));
        assert_eq!(summary.by_compliance.get("unknown"), Some(&1));
    }
}
