//! # Live Update Streams (SSE)
//!
//! Two streams, both `event: <name>\ndata: <json>\n\n` framed:
//!
//! - `/api/v1/fleet/events`: an initial snapshot (fleet summary, then the
//!   node list) followed by live fleet events from the hub. The background
//!   summary emitter refreshes the aggregate on a 30-second cadence.
//! - `/api/v1/events`: the controller's own compliance snapshot, re-sent
//!   every 30 seconds.
//!
//! Each handler moves its [`SubscriberGuard`] into the response stream, so
//! a client disconnect (or any failed write, which drops the stream) also
//! deregisters the subscriber. `X-Accel-Buffering: no` defeats
//! intermediary buffering.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::stream::{self, Stream, StreamExt};
use tokio_stream::wrappers::{IntervalStream, ReceiverStream};

use warden_core::{FleetEvent, FleetSummary, Node};
use warden_store::NodeFilter;

use crate::compliance::build_controller_report;
use crate::error::ApiError;
use crate::state::AppState;

/// Cadence for `/events` compliance snapshots.
const SNAPSHOT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/fleet/events", get(fleet_events))
        .route("/api/v1/events", get(controller_events))
}

fn sse_headers() -> [(axum::http::HeaderName, &'static str); 2] {
    [
        (axum::http::header::CACHE_CONTROL, "no-cache"),
        (
            axum::http::HeaderName::from_static("x-accel-buffering"),
            "no",
        ),
    ]
}

fn named_event<T: serde::Serialize>(name: &str, data: &T) -> Event {
    match serde_json::to_string(data) {
        Ok(json) => Event::default().event(name).data(json),
        Err(e) => {
            tracing::warn!(event = name, error = %e, "sse payload encoding failed");
            Event::default().comment("payload encoding failed")
        }
    }
}

fn encode_fleet_event(event: &FleetEvent) -> Event {
    named_event(event.kind.as_str(), event)
}

/// GET /api/v1/fleet/events — live fleet event stream.
async fn fleet_events(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    // Snapshot first, then register. Registration after the snapshot reads
    // keeps the mutex scope tiny; an event emitted in between is at worst
    // also reflected in the snapshot the client just received.
    let summary: FleetSummary = state.store.fleet_summary().await?;
    let nodes: Vec<Node> = state.store.list_nodes(&NodeFilter::default()).await?;
    let (guard, rx) = state.hub.subscribe();

    let initial = stream::iter(vec![
        named_event("fleet_summary", &FleetEvent::summary(summary)),
        named_event("node_list", &nodes),
    ]);
    let live = ReceiverStream::new(rx).map(|event| encode_fleet_event(&event));

    let stream = initial
        .chain(live)
        .map(move |event| {
            // The guard rides the stream; dropping the response deregisters.
            let _ = &guard;
            Ok::<_, Infallible>(event)
        });

    Ok((
        sse_headers(),
        Sse::new(stream).keep_alive(KeepAlive::default()),
    ))
}

/// GET /api/v1/events — controller compliance snapshots, 30 s cadence.
async fn controller_events(State(state): State<AppState>) -> impl IntoResponse {
    let first = {
        let state = state.clone();
        async move {
            let report = build_controller_report(&state).await;
            named_event("compliance", &report)
        }
    };

    let ticker = IntervalStream::new(tokio::time::interval_at(
        tokio::time::Instant::now() + SNAPSHOT_INTERVAL,
        SNAPSHOT_INTERVAL,
    ))
    .then(move |_| {
        let state = state.clone();
        async move {
            let report = build_controller_report(&state).await;
            named_event("compliance", &report)
        }
    });

    let stream: std::pin::Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>> =
        Box::pin(
            stream::once(first)
                .chain(ticker)
                .map(Ok::<_, Infallible>),
        );

    (
        sse_headers(),
        Sse::new(stream).keep_alive(KeepAlive::default()),
    )
}
