//! # warden-store — Durable Fleet Persistence
//!
//! SQLite persistence for everything the controller must remember across
//! restarts: nodes, enrollment tokens, the latest compliance report per
//! node, and remediation requests.
//!
//! ## Architecture
//!
//! [`FleetStore`] wraps a `sqlx::SqlitePool` over a single database file.
//! The file is created (with schema) if missing, so a fresh controller
//! starts from an empty fleet without any migration step. Each entity kind
//! has its own repository module; multi-row mutations that change a node's
//! visible state run inside one immediate write transaction.
//!
//! ## Consistency
//!
//! - Every multi-statement write transaction opens with an UPDATE, so the
//!   SQLite write lock is taken up front and token consumption and
//!   remediation delivery serialize.
//! - Reads are snapshot-consistent within a single call; the store makes no
//!   cross-call serializability promise.
//! - A failed write leaves the database in its pre-call state.
//!
//! ## Errors
//!
//! Every operation returns [`FleetError`] kinds. Driver errors are folded
//! into `FleetError::Internal` at this boundary; callers never see
//! `sqlx::Error`.

pub mod nodes;
pub mod remediation;
pub mod reports;
pub mod schema;
pub mod secret;
pub mod tokens;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

use warden_core::FleetError;

pub use nodes::{NewNode, NodeFilter};
pub use tokens::NewToken;

/// Handle to the fleet database. Cheap to clone; all clones share one pool.
#[derive(Clone)]
pub struct FleetStore {
    pool: SqlitePool,
}

impl FleetStore {
    /// Open (or create) the fleet database at `path` and ensure the schema
    /// exists. A missing file is recreated; a missing parent directory is
    /// an error the operator must fix.
    pub async fn open(path: &Path) -> Result<Self, FleetError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let store = Self::connect(options).await?;
        tracing::info!(path = %path.display(), "fleet store opened");
        Ok(store)
    }

    /// Open a private in-memory database. Test-only convenience; the pool
    /// is pinned to one connection so every query sees the same database.
    pub async fn open_in_memory() -> Result<Self, FleetError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(internal)?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(internal)?;

        schema::ensure(&pool).await?;
        Ok(Self { pool })
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self, FleetError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await
            .map_err(internal)?;

        schema::ensure(&pool).await?;
        Ok(Self { pool })
    }

    /// Access the underlying pool. Repository modules and the readiness
    /// probe use this; nothing else should.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Cheap health check used by the readiness probe.
    pub async fn ping(&self) -> Result<(), FleetError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(internal)?;
        Ok(())
    }
}

/// Fold a driver error into the store's `Internal` kind.
pub(crate) fn internal(err: sqlx::Error) -> FleetError {
    FleetError::Internal(format!("store: {err}"))
}

/// Parse a TEXT id column back into a `Uuid`.
pub(crate) fn parse_id(raw: &str) -> Result<Uuid, FleetError> {
    Uuid::parse_str(raw)
        .map_err(|e| FleetError::Internal(format!("corrupt id column {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.db");
        assert!(!path.exists());

        let store = FleetStore::open(&path).await.unwrap();
        store.ping().await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn reopen_preserves_schema_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.db");

        {
            let store = FleetStore::open(&path).await.unwrap();
            store
                .create_token(NewToken {
                    role: None,
                    region: None,
                    max_uses: 1,
                    expires_at: None,
                })
                .await
                .unwrap();
        }

        let store = FleetStore::open(&path).await.unwrap();
        let tokens = store.list_tokens().await.unwrap();
        assert_eq!(tokens.len(), 1);
    }

    #[test]
    fn parse_id_rejects_garbage() {
        assert!(parse_id("not-a-uuid").is_err());
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string()).unwrap(), id);
    }
}
