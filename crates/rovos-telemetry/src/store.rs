//! [`TelemetryStore`] – thread-safe map of device id → latest telemetry.
//!
//! Access is a plain mutex guarding write-replace and read-copy operations;
//! no iterator or reference ever crosses the lock boundary, so the lock is
//! held only for the duration of a clone. Per-device updates are independent
//! and unordered with respect to each other: within one device, samples
//! arrive in session order (monotonic `sequence`), but there is no
//! cross-device ordering guarantee.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use rovos_types::{ConnectionStatus, DeviceSample, TelemetryRecord};
use tracing::trace;

/// Shared map of the latest raw + filtered sample and link status per device.
///
/// Cheap to share via `Arc`; all methods take `&self`.
#[derive(Debug, Default)]
pub struct TelemetryStore {
    records: Mutex<HashMap<String, TelemetryRecord>>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a raw sample, overwriting the previous one (last-writer-wins).
    /// The filtered estimate carries over until the filter replaces it.
    pub fn publish_raw(&self, sample: DeviceSample) {
        trace!(device = %sample.device_id, seq = sample.sequence, "raw sample");
        let mut records = self.records.lock().expect("telemetry lock poisoned");
        let now = Utc::now();
        records
            .entry(sample.device_id.clone())
            .and_modify(|rec| {
                rec.last_raw = sample.clone();
                rec.updated_at = now;
            })
            .or_insert_with(|| TelemetryRecord {
                device_id: sample.device_id.clone(),
                last_raw: sample,
                last_filtered: None,
                status: ConnectionStatus::Disconnected,
                updated_at: now,
            });
    }

    /// Record the latest smoothed estimate for `device_id`.
    ///
    /// No-ops when no raw sample has been seen yet; a filtered value cannot
    /// exist before its raw input.
    pub fn publish_filtered(&self, device_id: &str, position: (f64, f64)) {
        let mut records = self.records.lock().expect("telemetry lock poisoned");
        if let Some(rec) = records.get_mut(device_id) {
            rec.last_filtered = Some(position);
            rec.updated_at = Utc::now();
        }
    }

    /// Transition the link status for `device_id`, creating a placeholder
    /// record when the device has not produced a sample yet.
    pub fn set_status(&self, device_id: &str, status: ConnectionStatus) {
        let mut records = self.records.lock().expect("telemetry lock poisoned");
        let now = Utc::now();
        records
            .entry(device_id.to_string())
            .and_modify(|rec| {
                rec.status = status;
                rec.updated_at = now;
            })
            .or_insert_with(|| TelemetryRecord {
                device_id: device_id.to_string(),
                last_raw: DeviceSample {
                    device_id: device_id.to_string(),
                    x_mm: 0.0,
                    y_mm: 0.0,
                    z_mm: 0.0,
                    timestamp: now,
                    sequence: 0,
                },
                last_filtered: None,
                status,
                updated_at: now,
            });
    }

    /// Copy out the record for one device.
    pub fn get(&self, device_id: &str) -> Option<TelemetryRecord> {
        self.records
            .lock()
            .expect("telemetry lock poisoned")
            .get(device_id)
            .cloned()
    }

    /// Copy out every record. Order is unspecified.
    pub fn snapshot(&self) -> Vec<TelemetryRecord> {
        self.records
            .lock()
            .expect("telemetry lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Number of devices currently tracked.
    pub fn len(&self) -> usize {
        self.records.lock().expect("telemetry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
