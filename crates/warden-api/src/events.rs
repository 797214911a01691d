//! # Event Hub — Fan-Out Bus for Fleet Events
//!
//! One ingress channel, one long-lived broadcast task, N subscriber
//! channels. Emitters send onto ingress; the broadcast task forwards each
//! event to every live subscriber with a non-blocking `try_send`, skipping
//! any subscriber whose buffer is full. A slow SSE client therefore drops
//! its own events and never back-pressures emitters or its peers.
//!
//! Ownership is single-direction: the registry holds only the write end of
//! each subscriber channel; the owning handler holds the read end. Neither
//! side closes the other's — deregistration just removes the sender from
//! the set, which [`SubscriberGuard`] does on drop so a disconnected
//! handler can never leak its slot. The broadcast task owns only the
//! registry and the ingress read end; once every [`EventHub`] clone (the
//! ingress senders) is gone, the task drains and returns cleanly.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use warden_core::FleetEvent;

/// Ingress buffer between emitters and the broadcast task.
const INGRESS_CAPACITY: usize = 64;

/// Per-subscriber buffer; a subscriber this far behind starts losing events.
pub const SUBSCRIBER_CAPACITY: usize = 64;

/// Emitter/subscriber handle to the bus. Cheap to clone; all clones feed
/// the same broadcast task.
#[derive(Clone)]
pub struct EventHub {
    ingress: mpsc::Sender<FleetEvent>,
    registry: Arc<Registry>,
}

struct Registry {
    subscribers: Mutex<HashMap<u64, mpsc::Sender<FleetEvent>>>,
    next_id: AtomicU64,
}

impl Registry {
    fn fan_out(&self, event: &FleetEvent) {
        let subscribers = self.subscribers.lock();
        for (id, tx) in subscribers.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::trace!(subscriber = id, kind = %event.kind, "subscriber buffer full, event skipped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    // The handler is unwinding; its guard removes the entry
                    // momentarily.
                }
            }
        }
    }
}

impl EventHub {
    /// Build the hub and its broadcast task. The caller spawns the task;
    /// it runs until every `EventHub` clone has been dropped.
    pub fn new() -> (Self, impl Future<Output = ()> + Send) {
        let (ingress, mut ingress_rx) = mpsc::channel::<FleetEvent>(INGRESS_CAPACITY);
        let registry = Arc::new(Registry {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        });

        let broadcast_registry = Arc::clone(&registry);
        let broadcast = async move {
            while let Some(event) = ingress_rx.recv().await {
                broadcast_registry.fan_out(&event);
            }
            tracing::debug!("event hub ingress closed, broadcast task exiting");
        };

        (Self { ingress, registry }, broadcast)
    }

    /// Publish an event. Awaits only if the ingress buffer is full, which
    /// bounds emitter latency by the broadcast task's lock-only loop —
    /// never by any subscriber.
    pub async fn emit(&self, event: FleetEvent) {
        if self.ingress.send(event).await.is_err() {
            tracing::warn!("event dropped: broadcast task is gone");
        }
    }

    /// Register a subscriber with the default buffer.
    pub fn subscribe(&self) -> (SubscriberGuard, mpsc::Receiver<FleetEvent>) {
        self.subscribe_with_capacity(SUBSCRIBER_CAPACITY)
    }

    /// Register a subscriber with an explicit buffer capacity.
    pub fn subscribe_with_capacity(
        &self,
        capacity: usize,
    ) -> (SubscriberGuard, mpsc::Receiver<FleetEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.subscribers.lock().insert(id, tx);
        tracing::debug!(subscriber = id, "sse subscriber registered");
        (
            SubscriberGuard {
                registry: Arc::clone(&self.registry),
                id,
            },
            rx,
        )
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.subscribers.lock().len()
    }
}

/// Removes its subscriber registration when dropped. Handlers move the
/// guard into their response stream so deregistration rides the stream's
/// drop, whether the client disconnected or a write failed.
pub struct SubscriberGuard {
    registry: Arc<Registry>,
    id: u64,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.registry.subscribers.lock().remove(&self.id);
        tracing::debug!(subscriber = self.id, "sse subscriber deregistered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::{FleetEventKind, FleetSummary};

    fn summary_event() -> FleetEvent {
        FleetEvent::summary(FleetSummary::default())
    }

    #[tokio::test]
    async fn events_reach_subscriber_in_order() {
        let (hub, broadcast) = EventHub::new();
        let task = tokio::spawn(broadcast);
        let (_guard, mut rx) = hub.subscribe();

        for _ in 0..5 {
            hub.emit(summary_event()).await;
        }

        for _ in 0..5 {
            let event = rx.recv().await.expect("event delivered");
            assert_eq!(event.kind, FleetEventKind::FleetSummary);
        }

        drop(hub);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn slow_subscriber_drops_excess_without_blocking() {
        let (hub, broadcast) = EventHub::new();
        tokio::spawn(broadcast);

        let (_slow_guard, mut slow_rx) = hub.subscribe_with_capacity(2);
        let (_fast_guard, mut fast_rx) = hub.subscribe_with_capacity(1024);

        // Emit more than the slow buffer holds. The emitter never blocks on
        // the slow subscriber; the fast one sees everything.
        for _ in 0..20 {
            hub.emit(summary_event()).await;
        }

        for _ in 0..20 {
            fast_rx.recv().await.expect("fast subscriber keeps up");
        }

        // The fast subscriber has seen event 20, so the broadcast task has
        // finished every fan-out round; the slow subscriber retained at
        // most its buffer's worth.
        let mut retained = 0;
        while slow_rx.try_recv().is_ok() {
            retained += 1;
        }
        assert!(retained <= 2, "retained {retained} events");

        // And its channel is still open: the next emission can land.
        hub.emit(summary_event()).await;
        assert!(slow_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn guard_drop_deregisters() {
        let (hub, broadcast) = EventHub::new();
        tokio::spawn(broadcast);

        let (guard, _rx) = hub.subscribe();
        let (guard2, _rx2) = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        drop(guard);
        assert_eq!(hub.subscriber_count(), 1);
        drop(guard2);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn broadcast_task_exits_when_last_emitter_drops() {
        let (hub, broadcast) = EventHub::new();
        let task = tokio::spawn(broadcast);

        hub.emit(summary_event()).await;
        drop(hub);

        tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .expect("task exits promptly")
            .unwrap();
    }
}
