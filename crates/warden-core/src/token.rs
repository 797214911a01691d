//! # Enrollment Tokens
//!
//! A bearer secret that authorizes creation of new nodes, optionally bounded
//! by role, use count, and expiry. The plaintext secret is returned exactly
//! once at creation; only its hash is stored, and the hash never appears on
//! this struct.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::node::NodeRole;

/// An enrollment token record as exposed to admins. Consumability is a pure
/// function of `uses_so_far`, `max_uses`, and `expires_at`; the atomic
/// consume itself lives in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentToken {
    pub id: Uuid,
    /// When set, enrolling nodes must claim exactly this role.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<NodeRole>,
    /// Region tag stamped onto nodes enrolled with this token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Maximum number of enrollments; 0 means unlimited.
    pub max_uses: i64,
    pub uses_so_far: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl EnrollmentToken {
    /// Whether the token is past its expiry as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|e| now >= e)
    }

    /// Whether every permitted use is already consumed.
    pub fn is_exhausted(&self) -> bool {
        self.max_uses > 0 && self.uses_so_far >= self.max_uses
    }

    /// A token is consumable iff not expired and not exhausted.
    pub fn is_consumable(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now) && !self.is_exhausted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(max_uses: i64, uses: i64, expires_at: Option<DateTime<Utc>>) -> EnrollmentToken {
        EnrollmentToken {
            id: Uuid::new_v4(),
            role: None,
            region: None,
            max_uses,
            uses_so_far: uses,
            expires_at,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn unlimited_token_never_exhausts() {
        let t = token(0, 1_000_000, None);
        assert!(!t.is_exhausted());
        assert!(t.is_consumable(Utc::now()));
    }

    #[test]
    fn bounded_token_exhausts_at_max() {
        let t = token(3, 3, None);
        assert!(t.is_exhausted());
        assert!(!t.is_consumable(Utc::now()));

        let t = token(3, 2, None);
        assert!(!t.is_exhausted());
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let now = Utc::now();
        let t = token(0, 0, Some(now));
        assert!(t.is_expired(now));
        assert!(!t.is_expired(now - chrono::Duration::seconds(1)));
    }

    #[test]
    fn secret_material_absent_from_serialized_token() {
        let t = token(1, 0, None);
        let json = serde_json::to_string(&t).unwrap();
        assert!(!json.contains("secret"));
        assert!(!json.contains("hash"));
    }
}
