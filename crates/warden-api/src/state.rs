//! # Application State
//!
//! Everything handlers share: the fleet store, the active policy handle,
//! the event hub, the network-verifier pieces, and resolved configuration.
//! Cloning is cheap; all fields are handles.

use std::sync::Arc;

use warden_policy::PolicyHandle;
use warden_store::FleetStore;
use warden_verifier::{EdgeApiClient, HelloInspector, PostureCollector};

use crate::config::ApiConfig;
use crate::events::EventHub;
use crate::middleware::metrics::ApiMetrics;

#[derive(Clone)]
pub struct AppState {
    pub store: FleetStore,
    pub policy: PolicyHandle,
    pub hub: EventHub,
    pub inspector: Arc<HelloInspector>,
    pub posture: Arc<PostureCollector>,
    /// Remote edge probe; absent when no API token/zone is configured.
    pub edge: Option<Arc<EdgeApiClient>>,
    pub metrics: ApiMetrics,
    pub config: Arc<ApiConfig>,
}

impl AppState {
    /// Assemble state around an open store. The hub's broadcast task is
    /// spawned here so every construction path gets a live bus.
    pub fn new(store: FleetStore, config: ApiConfig) -> Self {
        let (hub, broadcast) = EventHub::new();
        tokio::spawn(broadcast);

        Self {
            store,
            policy: PolicyHandle::new(),
            hub,
            inspector: Arc::new(HelloInspector::new()),
            posture: Arc::new(PostureCollector::new()),
            edge: None,
            metrics: ApiMetrics::new(),
            config: Arc::new(config),
        }
    }

    /// Attach the remote edge probe.
    pub fn with_edge(mut self, edge: EdgeApiClient) -> Self {
        self.edge = Some(Arc::new(edge));
        self
    }

    /// Fresh state over a private in-memory store. Test-only.
    #[doc(hidden)]
    pub async fn for_tests() -> Self {
        let store = FleetStore::open_in_memory()
            .await
            .expect("in-memory store opens");
        Self::new(store, ApiConfig::new())
    }
}
