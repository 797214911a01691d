//! # Prometheus Metrics
//!
//! Request counters and latency histograms recorded in middleware, plus
//! fleet gauges refreshed on each `/metrics` scrape (pull model). The
//! exposition endpoint lives on its own listener (`--metrics-addr`), kept
//! off the public API surface.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{
    Encoder, GaugeVec, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::state::AppState;

/// Shared metrics state backed by a Prometheus registry.
#[derive(Clone)]
pub struct ApiMetrics {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry,

    // -- HTTP middleware metrics (push model) --
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    http_errors_total: IntCounterVec,

    // -- Fleet gauges (pull model, updated on /metrics scrape) --
    nodes_total: GaugeVec,
    nodes_compliance: GaugeVec,
    sse_subscribers: prometheus::Gauge,
    hellos_observed: prometheus::Gauge,
}

impl std::fmt::Debug for ApiMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiMetrics").finish_non_exhaustive()
    }
}

impl ApiMetrics {
    /// Create a new metrics instance with a fresh Prometheus registry.
    pub fn new() -> Self {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("warden_http_requests_total", "Total HTTP requests"),
            &["method", "path", "status"],
        )
        .expect("metric can be created");

        let http_request_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "warden_http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["method", "path"],
        )
        .expect("metric can be created");

        let http_errors_total = IntCounterVec::new(
            Opts::new(
                "warden_http_errors_total",
                "Total HTTP errors (4xx and 5xx)",
            ),
            &["method", "path", "status"],
        )
        .expect("metric can be created");

        let nodes_total = GaugeVec::new(
            Opts::new("warden_nodes_total", "Fleet nodes by status"),
            &["status"],
        )
        .expect("metric can be created");

        let nodes_compliance = GaugeVec::new(
            Opts::new(
                "warden_nodes_compliance",
                "Fleet nodes by compliance status",
            ),
            &["compliance_status"],
        )
        .expect("metric can be created");

        let sse_subscribers = prometheus::Gauge::new(
            "warden_sse_subscribers",
            "Live SSE subscribers on the event hub",
        )
        .expect("metric can be created");

        let hellos_observed = prometheus::Gauge::new(
            "warden_clienthellos_observed_total",
            "TLS ClientHello messages observed since start",
        )
        .expect("metric can be created");

        for collector in [
            Box::new(http_requests_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(http_request_duration_seconds.clone()),
            Box::new(http_errors_total.clone()),
            Box::new(nodes_total.clone()),
            Box::new(nodes_compliance.clone()),
            Box::new(sse_subscribers.clone()),
            Box::new(hellos_observed.clone()),
        ] {
            registry
                .register(collector)
                .expect("metric registers once");
        }

        Self {
            inner: Arc::new(Inner {
                registry,
                http_requests_total,
                http_request_duration_seconds,
                http_errors_total,
                nodes_total,
                nodes_compliance,
                sse_subscribers,
                hellos_observed,
            }),
        }
    }

    fn record(&self, method: &str, path: &str, status: u16, elapsed_secs: f64) {
        let status = status.to_string();
        self.inner
            .http_requests_total
            .with_label_values(&[method, path, &status])
            .inc();
        self.inner
            .http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(elapsed_secs);
        if status.starts_with('4') || status.starts_with('5') {
            self.inner
                .http_errors_total
                .with_label_values(&[method, path, &status])
                .inc();
        }
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.inner.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "metrics encoding failed");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Record one request. Uses the matched route template (not the raw URI) so
/// path cardinality stays bounded.
pub async fn metrics_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<axum::extract::MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let start = Instant::now();
    let response = next.run(req).await;

    state.metrics.record(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

/// Router for the standalone metrics listener. Refreshes the fleet gauges
/// from the store on each scrape, then renders the registry.
pub fn metrics_router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(scrape))
        .with_state(state)
}

async fn scrape(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.fleet_summary().await {
        Ok(summary) => {
            let inner = &state.metrics.inner;
            inner.nodes_total.reset();
            for (status, count) in &summary.by_status {
                inner
                    .nodes_total
                    .with_label_values(&[status])
                    .set(*count as f64);
            }
            inner.nodes_compliance.reset();
            for (status, count) in &summary.by_compliance {
                inner
                    .nodes_compliance
                    .with_label_values(&[status])
                    .set(*count as f64);
            }
            inner
                .sse_subscribers
                .set(state.hub.subscriber_count() as f64);
            inner
                .hellos_observed
                .set(state.inspector.aggregates().total_observed as f64);
        }
        Err(e) => tracing::warn!(error = %e, "fleet gauge refresh failed"),
    }

    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        state.metrics.render(),
    )
}
