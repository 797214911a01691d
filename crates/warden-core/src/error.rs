//! # Error Types — Typed Failure Kinds
//!
//! Defines [`FleetError`], the error vocabulary returned by every core
//! operation in the controller. All errors use `thiserror` for derive-based
//! `Display` and `Error` implementations.
//!
//! The HTTP boundary (warden-api) owns the mapping from each kind to a
//! status code; nothing in this crate knows about HTTP. Store and verifier
//! internals are folded into `Internal`, `Upstream`, `Timeout`, or
//! `RateLimited` before they cross a crate boundary so callers match on
//! kinds, never on driver-specific error types.

use thiserror::Error;

/// Error kinds returned by core controller operations.
#[derive(Error, Debug)]
pub enum FleetError {
    /// The presented credential (enrollment token secret, node API key, or
    /// admin key) does not resolve to a known principal.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The enrollment token exists but is past its expiry.
    #[error("enrollment token expired")]
    TokenExpired,

    /// The enrollment token exists but all its uses are consumed.
    #[error("enrollment token exhausted")]
    TokenExhausted,

    /// The enrollment token pins a role and the request asked for another.
    #[error("token is restricted to role {expected}, requested {requested}")]
    RoleMismatch {
        /// Role the token is pinned to.
        expected: String,
        /// Role the enrolling node asked for.
        requested: String,
    },

    /// The referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller is authenticated but not allowed to act on this entity.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The request is structurally valid but semantically unacceptable.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The operation conflicts with current entity state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A downstream call exceeded its deadline.
    #[error("timeout: {0}")]
    Timeout(String),

    /// A remote API answered with a failure envelope.
    #[error("upstream error{}: {message}", .code.map(|c| format!(" (code {c})")).unwrap_or_default())]
    Upstream {
        /// Error code reported by the remote API, when present.
        code: Option<i64>,
        /// First error message from the remote envelope.
        message: String,
    },

    /// The remote API asked us to back off (HTTP 429).
    #[error("rate limited by upstream")]
    RateLimited,

    /// Anything unexpected: storage faults, serialization faults, broken
    /// invariants. The message is logged server-side and never shown to
    /// clients verbatim.
    #[error("internal error: {0}")]
    Internal(String),
}

impl FleetError {
    /// Shorthand for a `NotFound` over an entity kind and id.
    pub fn not_found(kind: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{kind} {id}"))
    }

    /// True for the kinds that indicate a caller mistake rather than a
    /// controller fault. Background tasks use this to decide between
    /// `warn!` and `error!` logging.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials
                | Self::TokenExpired
                | Self::TokenExhausted
                | Self::RoleMismatch { .. }
                | Self::NotFound(_)
                | Self::Forbidden(_)
                | Self::BadRequest(_)
                | Self::Conflict(_)
        )
    }
}
