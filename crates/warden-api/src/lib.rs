//! # warden-api — HTTP Surface and Runtime for FleetWarden
//!
//! Assembles the controller's REST + SSE API and hosts the runtime pieces
//! around it: the event hub, the background sweepers, the compliance
//! aggregator, and the `wardend` binary.
//!
//! ## API Surface (all under `/api/v1`)
//!
//! | Prefix                     | Module                  | Domain              |
//! |----------------------------|-------------------------|---------------------|
//! | `/compliance*`, `/manifest`, `/selftest` | [`routes::compliance`] | Controller self-report |
//! | `/events`                  | [`routes::events`]      | Controller SSE      |
//! | `/fleet/tokens*`           | [`routes::tokens`]      | Enrollment tokens   |
//! | `/fleet/enroll`            | [`routes::enroll`]      | Enrollment          |
//! | `/fleet/report`, `/fleet/heartbeat` | [`routes::ingest`] | Posture ingest  |
//! | `/fleet/nodes*`, `/fleet/summary`, `/fleet/routes` | [`routes::nodes`] | Fleet queries, routing gate |
//! | `/fleet/policy`            | [`routes::policy`]      | Policy              |
//! | `/fleet/nodes/{id}/remediate*`, `/fleet/remediate/plan/{id}` | [`routes::remediation`] | Remediation |
//! | `/posture`                 | [`routes::posture`]     | Device posture      |
//! | `/network/clients`         | [`routes::network`]     | Observed TLS clients |
//! | `/fleet/events`            | [`routes::events`]      | Fleet SSE           |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → SecurityHeaders → Metrics → Handler
//! ```
//!
//! Authentication is per-route via the extractors in [`auth`]: admin key,
//! node API key, or open, per the endpoint table in the module docs above.

pub mod auth;
pub mod compliance;
pub mod config;
pub mod error;
pub mod events;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod sweeper;

use axum::extract::{DefaultBodyLimit, State};
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .merge(routes::compliance::router())
        .merge(routes::events::router())
        .merge(routes::tokens::router())
        .merge(routes::enroll::router())
        .merge(routes::ingest::router())
        .merge(routes::nodes::router())
        .merge(routes::policy::router())
        .merge(routes::remediation::router())
        .merge(routes::posture::router())
        .merge(routes::network::router())
        .route("/api/v1/health", get(health))
        .route("/api/v1/health/readiness", get(readiness));

    // Body size limit: 1 MiB. Compliance reports are small; anything larger
    // is a misbehaving agent. Metrics ride a route_layer so the matched
    // path template is available for bounded-cardinality labels.
    api.route_layer(from_fn_with_state(
        state.clone(),
        middleware::metrics::metrics_middleware,
    ))
    .layer(DefaultBodyLimit::max(1024 * 1024))
    .layer(axum::middleware::from_fn(middleware::security_headers))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

/// GET /api/v1/health — liveness plus version.
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": state.config.version,
    }))
}

/// GET /api/v1/health/readiness — verifies the store answers queries.
async fn readiness(State(state): State<AppState>) -> axum::response::Response {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "ready").into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "store unreachable").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_reports_ok_and_version() {
        let state = AppState::for_tests().await;
        let app = app(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn responses_carry_security_headers() {
        let state = AppState::for_tests().await;
        let app = app(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
        assert_eq!(response.headers()["x-frame-options"], "DENY");
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let state = AppState::for_tests().await;
        let app = app(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
