//! # Enrollment Token Repository
//!
//! Token issuance, lookup, and the atomic one-use consume. The plaintext
//! secret exists only in the return value of [`FleetStore::create_token`];
//! the table stores its hash.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use warden_core::{EnrollmentToken, FleetError, NodeRole};

use crate::secret::{generate_secret, hash_secret, verify_secret};
use crate::{internal, parse_id, FleetStore};

/// Parameters for token creation.
#[derive(Debug, Clone)]
pub struct NewToken {
    /// Pin enrollments to this role; `None` leaves the role to the request.
    pub role: Option<NodeRole>,
    pub region: Option<String>,
    /// 0 means unlimited.
    pub max_uses: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

impl FleetStore {
    /// Create an enrollment token. Returns the record and the plaintext
    /// secret; the secret is not recoverable afterwards.
    pub async fn create_token(
        &self,
        new: NewToken,
    ) -> Result<(EnrollmentToken, String), FleetError> {
        if new.max_uses < 0 {
            return Err(FleetError::BadRequest("max_uses must be >= 0".into()));
        }

        let token = EnrollmentToken {
            id: Uuid::new_v4(),
            role: new.role,
            region: new.region,
            max_uses: new.max_uses,
            uses_so_far: 0,
            expires_at: new.expires_at,
            created_at: Utc::now(),
        };
        let secret = generate_secret();

        sqlx::query(
            "INSERT INTO tokens (id, secret_hash, role, region, max_uses, uses_so_far, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
        )
        .bind(token.id.to_string())
        .bind(hash_secret(&secret))
        .bind(token.role.map(|r| r.as_str().to_string()))
        .bind(&token.region)
        .bind(token.max_uses)
        .bind(token.expires_at)
        .bind(token.created_at)
        .execute(self.pool())
        .await
        .map_err(internal)?;

        Ok((token, secret))
    }

    /// List all tokens, newest first.
    pub async fn list_tokens(&self) -> Result<Vec<EnrollmentToken>, FleetError> {
        let rows = sqlx::query_as::<_, TokenRow>(
            "SELECT id, secret_hash, role, region, max_uses, uses_so_far, expires_at, created_at
             FROM tokens ORDER BY created_at DESC",
        )
        .fetch_all(self.pool())
        .await
        .map_err(internal)?;

        rows.into_iter().map(TokenRow::into_record).collect()
    }

    /// Delete a token by id.
    pub async fn delete_token(&self, id: Uuid) -> Result<(), FleetError> {
        let result = sqlx::query("DELETE FROM tokens WHERE id = ?1")
            .bind(id.to_string())
            .execute(self.pool())
            .await
            .map_err(internal)?;

        if result.rows_affected() == 0 {
            return Err(FleetError::not_found("token", id));
        }
        Ok(())
    }

    /// Resolve a presented secret to its token record.
    ///
    /// Lookup is by hash; the stored hash is then re-verified against the
    /// presented secret in constant time. A miss is `InvalidCredentials` —
    /// callers cannot distinguish "no such token" from "wrong secret".
    pub async fn find_token_by_secret(
        &self,
        secret: &str,
    ) -> Result<EnrollmentToken, FleetError> {
        let row = sqlx::query_as::<_, TokenRow>(
            "SELECT id, secret_hash, role, region, max_uses, uses_so_far, expires_at, created_at
             FROM tokens WHERE secret_hash = ?1",
        )
        .bind(hash_secret(secret))
        .fetch_optional(self.pool())
        .await
        .map_err(internal)?;

        match row {
            Some(row) if verify_secret(secret, &row.secret_hash) => row.into_record(),
            _ => Err(FleetError::InvalidCredentials),
        }
    }
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
pub(crate) struct TokenRow {
    id: String,
    pub(crate) secret_hash: String,
    role: Option<String>,
    region: Option<String>,
    pub(crate) max_uses: i64,
    pub(crate) uses_so_far: i64,
    pub(crate) expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TokenRow {
    pub(crate) fn into_record(self) -> Result<EnrollmentToken, FleetError> {
        let role = match self.role {
            Some(raw) => match NodeRole::parse(&raw) {
                Some(role) => Some(role),
                None => {
                    tracing::warn!(id = %self.id, role = %raw, "unknown token role in database, treating as unpinned");
                    None
                }
            },
            None => None,
        };

        Ok(EnrollmentToken {
            id: parse_id(&self.id)?,
            role,
            region: self.region,
            max_uses: self.max_uses,
            uses_so_far: self.uses_so_far,
            expires_at: self.expires_at,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_find_by_secret() {
        let store = FleetStore::open_in_memory().await.unwrap();
        let (created, secret) = store
            .create_token(NewToken {
                role: Some(NodeRole::Server),
                region: Some("eu-west".into()),
                max_uses: 5,
                expires_at: None,
            })
            .await
            .unwrap();

        let found = store.find_token_by_secret(&secret).await.unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.role, Some(NodeRole::Server));
        assert_eq!(found.max_uses, 5);
    }

    #[tokio::test]
    async fn wrong_secret_is_invalid_credentials() {
        let store = FleetStore::open_in_memory().await.unwrap();
        store
            .create_token(NewToken {
                role: None,
                region: None,
                max_uses: 0,
                expires_at: None,
            })
            .await
            .unwrap();

        let err = store
            .find_token_by_secret("deadbeef")
            .await
            .expect_err("must not resolve");
        assert!(matches!(err, FleetError::InvalidCredentials));
    }

    #[tokio::test]
    async fn delete_token_is_not_found_twice() {
        let store = FleetStore::open_in_memory().await.unwrap();
        let (token, _) = store
            .create_token(NewToken {
                role: None,
                region: None,
                max_uses: 1,
                expires_at: None,
            })
            .await
            .unwrap();

        store.delete_token(token.id).await.unwrap();
        let err = store.delete_token(token.id).await.expect_err("gone");
        assert!(matches!(err, FleetError::NotFound(_)));
    }

    #[tokio::test]
    async fn negative_max_uses_rejected() {
        let store = FleetStore::open_in_memory().await.unwrap();
        let err = store
            .create_token(NewToken {
                role: None,
                region: None,
                max_uses: -1,
                expires_at: None,
            })
            .await
            .expect_err("rejected");
        assert!(matches!(err, FleetError::BadRequest(_)));
    }
}
