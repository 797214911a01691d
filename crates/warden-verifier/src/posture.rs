//! # Device-Posture Collector
//!
//! In-memory map of endpoint posture keyed by device id. Device agents push
//! snapshots over the posture API; the aggregator joins them with the
//! ClientHello inspector's verdicts. Nothing here is durable.

use chrono::Utc;
use dashmap::DashMap;

use warden_core::DevicePosture;

/// Concurrent posture map. Upserts replace the whole snapshot for a device;
/// `last_seen` is stamped on every push.
#[derive(Debug, Default)]
pub struct PostureCollector {
    devices: DashMap<String, DevicePosture>,
}

impl PostureCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the posture for `posture.device_id`.
    pub fn upsert(&self, mut posture: DevicePosture) {
        posture.last_seen = Utc::now();
        self.devices.insert(posture.device_id.clone(), posture);
    }

    pub fn get(&self, device_id: &str) -> Option<DevicePosture> {
        self.devices.get(device_id).map(|entry| entry.value().clone())
    }

    /// All postures, ordered by device id for stable API output.
    pub fn list(&self) -> Vec<DevicePosture> {
        let mut all: Vec<DevicePosture> =
            self.devices.iter().map(|entry| entry.value().clone()).collect();
        all.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        all
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Count of devices reporting OS FIPS enabled / disk encrypted.
    pub fn counts(&self) -> (usize, usize) {
        let mut fips = 0;
        let mut encrypted = 0;
        for entry in self.devices.iter() {
            if entry.os_fips_enabled == Some(true) {
                fips += 1;
            }
            if entry.disk_encrypted == Some(true) {
                encrypted += 1;
            }
        }
        (fips, encrypted)
    }
}
