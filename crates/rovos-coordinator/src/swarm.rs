//! [`SwarmCoordinator`] – fleet-wide position aggregation.
//!
//! One long-lived polling task per roster entry keeps a shared [`SwarmView`]
//! current. A rover that stops answering only has its own entry marked
//! stale; the other pollers never notice.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::{DEFAULT_RPC_TIMEOUT, RoverClient};
use crate::wire::CoordinateReport;

/// One rover endpoint in the fleet roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub id: String,
    pub ip: String,
    pub port: u16,
}

/// Latest aggregated knowledge about one rover.
#[derive(Debug, Clone, PartialEq)]
pub struct SwarmEntry {
    pub device_id: String,
    /// Last successful report, kept through staleness so consumers can show
    /// the rover's last known position.
    pub report: Option<CoordinateReport>,
    /// `false` once a poll has failed; `true` again on the next success.
    pub fresh: bool,
    pub last_update: Option<DateTime<Utc>>,
}

/// Shared fleet snapshot, copy-out semantics like the telemetry store.
#[derive(Debug, Default)]
pub struct SwarmView {
    entries: Mutex<HashMap<String, SwarmEntry>>,
}

impl SwarmView {
    pub fn new() -> Self {
        Self::default()
    }

    fn update_success(&self, device_id: &str, report: CoordinateReport) {
        let mut entries = self.entries.lock().expect("swarm view poisoned");
        entries.insert(
            device_id.to_string(),
            SwarmEntry {
                device_id: device_id.to_string(),
                report: Some(report),
                fresh: true,
                last_update: Some(Utc::now()),
            },
        );
    }

    fn mark_stale(&self, device_id: &str) {
        let mut entries = self.entries.lock().expect("swarm view poisoned");
        entries
            .entry(device_id.to_string())
            .and_modify(|e| e.fresh = false)
            .or_insert_with(|| SwarmEntry {
                device_id: device_id.to_string(),
                report: None,
                fresh: false,
                last_update: None,
            });
    }

    pub fn get(&self, device_id: &str) -> Option<SwarmEntry> {
        self.entries
            .lock()
            .expect("swarm view poisoned")
            .get(device_id)
            .cloned()
    }

    /// Copy out every entry. Order is unspecified.
    pub fn snapshot(&self) -> Vec<SwarmEntry> {
        self.entries
            .lock()
            .expect("swarm view poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("swarm view poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Spawns and owns the per-rover polling tasks.
pub struct SwarmCoordinator {
    view: Arc<SwarmView>,
    stop: Arc<AtomicBool>,
    poll_interval: Duration,
    rpc_timeout: Duration,
}

impl SwarmCoordinator {
    pub fn new(stop: Arc<AtomicBool>) -> Self {
        Self {
            view: Arc::new(SwarmView::new()),
            stop,
            poll_interval: Duration::from_millis(500),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    pub fn view(&self) -> Arc<SwarmView> {
        Arc::clone(&self.view)
    }

    /// Start one polling task per roster entry.
    pub fn spawn_pollers(&self, roster: &[RosterEntry]) -> Vec<JoinHandle<()>> {
        roster
            .iter()
            .map(|entry| {
                let entry = entry.clone();
                let view = Arc::clone(&self.view);
                let stop = Arc::clone(&self.stop);
                let client =
                    RoverClient::new(entry.ip.clone(), entry.port).with_timeout(self.rpc_timeout);
                let interval = self.poll_interval;
                tokio::spawn(poll_rover(entry, client, view, stop, interval))
            })
            .collect()
    }
}

/// The per-rover polling loop: kick off ranging once, then poll coordinates
/// until the stop flag is raised. Every failure only touches this rover's
/// entry.
async fn poll_rover(
    entry: RosterEntry,
    client: RoverClient,
    view: Arc<SwarmView>,
    stop: Arc<AtomicBool>,
    interval: Duration,
) {
    info!(device = %entry.id, endpoint = %client.endpoint(), "poller started");
    let mut ranging_started = false;
    while !stop.load(Ordering::SeqCst) {
        if !ranging_started {
            match client.start_connection(&entry.id).await {
                Ok(()) => ranging_started = true,
                Err(err) => {
                    warn!(device = %entry.id, %err, "start_connection failed");
                    view.mark_stale(&entry.id);
                    tokio::time::sleep(interval).await;
                    continue;
                }
            }
        }
        match client.get_coordinates().await {
            Ok(report) => {
                debug!(device = %entry.id, x = report.x, y = report.y, "poll ok");
                view.update_success(&entry.id, report);
            }
            Err(err) => {
                warn!(device = %entry.id, %err, "poll failed, marking stale");
                view.mark_stale(&entry.id);
            }
        }
        tokio::time::sleep(interval).await;
    }
    info!(device = %entry.id, "poller stopped");
}
