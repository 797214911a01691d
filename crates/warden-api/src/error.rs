//! # API Error Boundary
//!
//! Wraps [`FleetError`] for Axum and maps each kind to its HTTP status.
//! Failure bodies are the flat `{"error": "..."}` shape; internal and
//! upstream messages are replaced with generic text at the boundary and
//! logged server-side, so handlers can carry diagnostic detail without
//! leaking it.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use warden_core::FleetError;

/// Handler-level error. `?` converts any `FleetError` produced by the
/// store, policy engine, or verifier straight into a response.
#[derive(Debug)]
pub struct ApiError(pub FleetError);

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(FleetError::BadRequest(msg.into()))
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self(FleetError::Forbidden(msg.into()))
    }

    fn status(&self) -> StatusCode {
        match &self.0 {
            FleetError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            FleetError::TokenExpired
            | FleetError::TokenExhausted
            | FleetError::RoleMismatch { .. }
            | FleetError::Forbidden(_) => StatusCode::FORBIDDEN,
            FleetError::NotFound(_) => StatusCode::NOT_FOUND,
            FleetError::BadRequest(_) => StatusCode::BAD_REQUEST,
            FleetError::Conflict(_) => StatusCode::CONFLICT,
            FleetError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            FleetError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            FleetError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            FleetError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<FleetError> for ApiError {
    fn from(err: FleetError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Never expose internal or upstream detail to clients.
        let message = match &self.0 {
            FleetError::Internal(_) => "internal error".to_string(),
            FleetError::Upstream { .. } => "upstream service error".to_string(),
            other => other.to_string(),
        };

        match &self.0 {
            FleetError::Internal(_) => tracing::error!(error = %self.0, "internal error"),
            FleetError::Upstream { .. } | FleetError::Timeout(_) | FleetError::RateLimited => {
                tracing::warn!(error = %self.0, "upstream failure")
            }
            _ => {}
        }

        let body = serde_json::json!({ "error": message });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn response_parts(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn status_mapping_matches_contract() {
        let cases = [
            (FleetError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (FleetError::TokenExpired, StatusCode::FORBIDDEN),
            (FleetError::TokenExhausted, StatusCode::FORBIDDEN),
            (
                FleetError::RoleMismatch {
                    expected: "server".into(),
                    requested: "proxy".into(),
                },
                StatusCode::FORBIDDEN,
            ),
            (FleetError::not_found("node", "x"), StatusCode::NOT_FOUND),
            (FleetError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (FleetError::BadRequest("bad".into()), StatusCode::BAD_REQUEST),
            (FleetError::Conflict("dup".into()), StatusCode::CONFLICT),
            (FleetError::Timeout("slow".into()), StatusCode::GATEWAY_TIMEOUT),
            (
                FleetError::Upstream {
                    code: Some(1),
                    message: "edge".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (FleetError::RateLimited, StatusCode::TOO_MANY_REQUESTS),
            (
                FleetError::Internal("db".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let (status, body) = response_parts(ApiError(err)).await;
            assert_eq!(status, expected);
            assert!(body["error"].is_string());
        }
    }

    #[tokio::test]
    async fn internal_detail_is_not_leaked() {
        let (_, body) =
            response_parts(ApiError(FleetError::Internal("connection to /var/db".into()))).await;
        assert_eq!(body["error"], "internal error");
    }

    #[tokio::test]
    async fn upstream_detail_is_not_leaked() {
        let (_, body) = response_parts(ApiError(FleetError::Upstream {
            code: Some(10000),
            message: "secret zone name".into(),
        }))
        .await;
        assert_eq!(body["error"], "upstream service error");
    }

    #[tokio::test]
    async fn client_errors_keep_their_message() {
        let (_, body) =
            response_parts(ApiError::bad_request("actions must be a non-empty list")).await;
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("non-empty list"));
    }
}
