//! # Background Sweepers
//!
//! Periodic maintenance expressed as one ticker loop per task, per the
//! scheduled-work rule: no ad-hoc timers inside handlers.
//!
//! - **Staleness sweep** (every 30 s): nodes silent past the offline
//!   threshold transition to `offline` with a `node_updated` event, and
//!   `delivered` remediation requests older than the delivery TTL revert
//!   to `pending`.
//! - **Summary emitter** (every 30 s): publishes the fleet summary onto
//!   the event hub so every SSE subscriber sees a fresh aggregate on a
//!   fixed cadence.
//!
//! Both loops log failures and continue; a store hiccup never kills the
//! task. They exit when the process shuts down.

use std::time::Duration;

use chrono::Utc;

use warden_core::{FleetEvent, FleetEventKind};

use crate::state::AppState;

/// Expected agent heartbeat period.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(60);

/// A node is offline after 3 missed heartbeats.
pub const OFFLINE_THRESHOLD: Duration = Duration::from_secs(180);

/// How long a `delivered` remediation waits for a result before it is
/// re-offered.
pub const REMEDIATION_DELIVERY_TTL: Duration = Duration::from_secs(15 * 60);

/// Sweep cadence; staleness detection lags by at most one tick.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Fleet-summary broadcast cadence.
pub const SUMMARY_INTERVAL: Duration = Duration::from_secs(30);

/// Staleness sweep loop. Spawn once at startup.
pub async fn run_staleness_sweeper(state: AppState) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        sweep_once(&state).await;
    }
}

/// One sweep pass. Separated from the loop for tests.
pub async fn sweep_once(state: &AppState) {
    let now = Utc::now();

    let heartbeat_cutoff = now
        - chrono::Duration::from_std(OFFLINE_THRESHOLD)
            .unwrap_or_else(|_| chrono::Duration::seconds(180));
    match state.store.mark_stale_offline(heartbeat_cutoff).await {
        Ok(swept) => {
            for node in swept {
                tracing::info!(node = %node.id, name = %node.name, "node heartbeat stale, marked offline");
                state
                    .hub
                    .emit(FleetEvent::for_node(FleetEventKind::NodeUpdated, node))
                    .await;
            }
        }
        Err(e) => tracing::warn!(error = %e, "staleness sweep failed"),
    }

    let delivery_cutoff = now
        - chrono::Duration::from_std(REMEDIATION_DELIVERY_TTL)
            .unwrap_or_else(|_| chrono::Duration::minutes(15));
    match state.store.revert_stale_deliveries(delivery_cutoff).await {
        Ok(0) => {}
        Ok(reverted) => {
            tracing::info!(reverted, "stale remediation deliveries re-pended");
        }
        Err(e) => tracing::warn!(error = %e, "remediation delivery sweep failed"),
    }
}

/// Fleet-summary emitter loop. Spawn once at startup.
pub async fn run_summary_emitter(state: AppState) {
    let mut ticker = tokio::time::interval(SUMMARY_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match state.store.fleet_summary().await {
            Ok(summary) => state.hub.emit(FleetEvent::summary(summary)).await,
            Err(e) => tracing::warn!(error = %e, "fleet summary emission failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::{NodeRole, NodeStatus};
    use warden_store::{NewNode, NewToken};

    #[tokio::test]
    async fn sweep_marks_stale_node_offline_and_emits() {
        let state = AppState::for_tests().await;
        let (_guard, mut rx) = state.hub.subscribe();

        let (token, _) = state
            .store
            .create_token(NewToken {
                role: None,
                region: None,
                max_uses: 0,
                expires_at: None,
            })
            .await
            .unwrap();
        let (node, _) = state
            .store
            .enroll_node(
                &token,
                NewNode {
                    name: "stale".into(),
                    role: NodeRole::Server,
                    region: None,
                    version: "1.0.0".into(),
                    fips_backend: "openssl-fips".into(),
                    service: None,
                },
            )
            .await
            .unwrap();
        state
            .store
            .update_heartbeat(node.id, Utc::now() - chrono::Duration::minutes(10))
            .await
            .unwrap();

        sweep_once(&state).await;

        let swept = state.store.get_node(node.id).await.unwrap();
        assert_eq!(swept.status, NodeStatus::Offline);

        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("event within deadline")
            .expect("event delivered");
        assert_eq!(event.kind, FleetEventKind::NodeUpdated);
        assert_eq!(event.node.unwrap().id, node.id);

        // Nothing left to sweep; no further events.
        sweep_once(&state).await;
        assert!(rx.try_recv().is_err());
    }
}
