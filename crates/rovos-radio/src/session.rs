//! [`RangingSession`] – the per-device acquisition loop.
//!
//! One session owns one [`RangingTransport`] and runs until the shared stop
//! flag is raised: optionally scan for the device's advertisement, connect
//! (bounded by a timeout), read samples, publish each good reading to the
//! [`TelemetryStore`] and forward it to the filter pump. Scan misses,
//! connection failures and lost links put the session on a fixed-backoff
//! reconnect path; it never gives up on its own.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use rovos_types::{ConnectionStatus, DeviceSample, RadioError};
use rovos_telemetry::TelemetryStore;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::transport::{DeviceScanner, RangingTransport};

/// Tunables for one ranging session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Device id used for telemetry keys and log fields.
    pub device_id: String,
    /// Upper bound on one connect attempt.
    pub connect_timeout: Duration,
    /// Fixed pause between reconnect attempts.
    pub reconnect_backoff: Duration,
    /// Upper bound on one advertisement scan (only used when a scanner is
    /// attached).
    pub scan_timeout: Duration,
    /// When set, the link description must contain this string for the
    /// session to report [`ConnectionStatus::Verified`] instead of
    /// `Connected`.
    pub expected_identity: Option<String>,
}

impl SessionConfig {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            connect_timeout: Duration::from_secs(60),
            reconnect_backoff: Duration::from_secs(10),
            scan_timeout: Duration::from_secs(10),
            expected_identity: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    pub fn with_expected_identity(mut self, identity: impl Into<String>) -> Self {
        self.expected_identity = Some(identity.into());
        self
    }
}

/// Acquisition loop for one UWB device.
///
/// Owns its transport; shares the telemetry store, the sample channel and
/// the stop flag with the rest of the stack.
pub struct RangingSession {
    config: SessionConfig,
    transport: Box<dyn RangingTransport>,
    scanner: Option<Box<dyn DeviceScanner>>,
    store: Arc<TelemetryStore>,
    samples: mpsc::Sender<DeviceSample>,
    stop: Arc<AtomicBool>,
    sequence: u64,
}

impl RangingSession {
    pub fn new(
        config: SessionConfig,
        transport: Box<dyn RangingTransport>,
        store: Arc<TelemetryStore>,
        samples: mpsc::Sender<DeviceSample>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            transport,
            scanner: None,
            store,
            samples,
            stop,
            sequence: 0,
        }
    }

    /// Gate connect attempts on the device advertising itself. The scan
    /// filter is the session's device id.
    pub fn with_scanner(mut self, scanner: Box<dyn DeviceScanner>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Run until the stop flag is raised. Consumes the session.
    pub async fn run(mut self) {
        let device = self.config.device_id.clone();
        while !self.stopped() {
            self.store.set_status(&device, ConnectionStatus::Connecting);
            if !self.scan_for_device(&device).await {
                self.backoff().await;
                continue;
            }
            match self.try_connect().await {
                Ok(()) => {
                    let status = self.connected_status();
                    info!(%device, link = %self.transport.describe(), %status, "link up");
                    self.store.set_status(&device, status);
                    if !self.read_loop(&device).await {
                        break;
                    }
                    self.transport.disconnect().await;
                }
                Err(err) => {
                    warn!(%device, %err, "connect failed");
                    self.store.set_status(&device, ConnectionStatus::Disconnected);
                }
            }
            self.backoff().await;
        }
        self.transport.disconnect().await;
        self.store.set_status(&device, ConnectionStatus::Disconnected);
        info!(%device, "session stopped");
    }

    fn connected_status(&self) -> ConnectionStatus {
        match &self.config.expected_identity {
            Some(identity) if self.transport.describe().contains(identity.as_str()) => {
                ConnectionStatus::Verified
            }
            _ => ConnectionStatus::Connected,
        }
    }

    /// Wait for the device to advertise. Always passes when no scanner is
    /// attached (the serial path needs none).
    async fn scan_for_device(&mut self, device: &str) -> bool {
        let Some(scanner) = self.scanner.as_mut() else {
            return true;
        };
        match scanner.scan(device, self.config.scan_timeout).await {
            Ok(Some(handle)) => {
                debug!(%device, address = %handle.address, "device advertised");
                true
            }
            Ok(None) => {
                let err = RadioError::ScanTimeout {
                    name_filter: device.to_string(),
                    timeout_secs: self.config.scan_timeout.as_secs(),
                };
                warn!(%device, %err, "no advertisement");
                self.store.set_status(device, ConnectionStatus::Disconnected);
                false
            }
            Err(err) => {
                warn!(%device, %err, "scan failed");
                self.store.set_status(device, ConnectionStatus::Disconnected);
                false
            }
        }
    }

    async fn try_connect(&mut self) -> Result<(), RadioError> {
        match tokio::time::timeout(self.config.connect_timeout, self.transport.connect()).await {
            Ok(result) => result,
            Err(_) => Err(RadioError::ConnectFailed {
                device: self.config.device_id.clone(),
                details: format!(
                    "no connection after {}s",
                    self.config.connect_timeout.as_secs()
                ),
            }),
        }
    }

    /// Read until the link drops or the stop flag is raised.
    ///
    /// Returns `false` when the session should shut down for good (stop flag,
    /// or the sample channel is gone), `true` to take the reconnect path.
    async fn read_loop(&mut self, device: &str) -> bool {
        loop {
            if self.stopped() {
                return false;
            }
            match self.transport.read_sample().await {
                Ok(pos) => {
                    self.sequence += 1;
                    let sample = DeviceSample {
                        device_id: device.to_string(),
                        x_mm: pos.x_mm,
                        y_mm: pos.y_mm,
                        z_mm: pos.z_mm,
                        timestamp: Utc::now(),
                        sequence: self.sequence,
                    };
                    self.store.publish_raw(sample.clone());
                    if self.samples.send(sample).await.is_err() {
                        debug!(%device, "sample channel closed, shutting down");
                        return false;
                    }
                }
                Err(RadioError::ReadMalformed(details)) => {
                    warn!(%device, %details, "malformed reading skipped");
                }
                Err(err) => {
                    warn!(%device, %err, "link lost");
                    self.store.set_status(device, ConnectionStatus::Error);
                    return true;
                }
            }
        }
    }

    /// Sleep out the reconnect backoff in short slices so the stop flag
    /// stays responsive. Takes `&mut self` like the other awaited methods:
    /// the transport box is `Send` but not `Sync`, so `run`'s future must
    /// never hold a shared borrow of the session across an await.
    async fn backoff(&mut self) {
        let deadline = Instant::now() + self.config.reconnect_backoff;
        while !self.stopped() {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            let slice = (deadline - now).min(Duration::from_millis(25));
            tokio::time::sleep(slice).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimScanner, SimTransport};
    use crate::transport::DeviceHandle;

    fn fast_config(device: &str) -> SessionConfig {
        SessionConfig::new(device)
            .with_connect_timeout(Duration::from_millis(200))
            .with_reconnect_backoff(Duration::from_millis(1))
    }

    fn harness() -> (
        Arc<TelemetryStore>,
        mpsc::Receiver<DeviceSample>,
        mpsc::Sender<DeviceSample>,
        Arc<AtomicBool>,
    ) {
        let store = Arc::new(TelemetryStore::new());
        let (tx, rx) = mpsc::channel(64);
        let stop = Arc::new(AtomicBool::new(false));
        (store, rx, tx, stop)
    }

    #[tokio::test]
    async fn samples_are_published_with_monotonic_sequence() {
        let (store, mut rx, tx, stop) = harness();
        let sim = SimTransport::new()
            .with_sample(100.0, 200.0, 0.0)
            .with_sample(110.0, 210.0, 0.0)
            .with_sample(120.0, 220.0, 0.0);
        let session = RangingSession::new(
            fast_config("Rov1"),
            Box::new(sim),
            Arc::clone(&store),
            tx,
            Arc::clone(&stop),
        );
        let task = tokio::spawn(session.run());

        let mut sequences = Vec::new();
        for _ in 0..3 {
            sequences.push(rx.recv().await.expect("sample").sequence);
        }
        stop.store(true, Ordering::SeqCst);
        task.await.unwrap();

        assert_eq!(sequences, vec![1, 2, 3]);
        let rec = store.get("Rov1").expect("record");
        assert_eq!(rec.last_raw.sequence, 3);
        assert_eq!(rec.last_raw.x_mm, 120.0);
        assert_eq!(rec.status, ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn malformed_reading_is_skipped_not_fatal() {
        let (store, mut rx, tx, stop) = harness();
        let sim = SimTransport::new()
            .with_sample(1.0, 1.0, 0.0)
            .with_malformed("garbled frame")
            .with_sample(2.0, 2.0, 0.0);
        let session = RangingSession::new(
            fast_config("Rov1"),
            Box::new(sim),
            store,
            tx,
            Arc::clone(&stop),
        );
        let task = tokio::spawn(session.run());

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        stop.store(true, Ordering::SeqCst);
        task.await.unwrap();

        assert_eq!((first.x_mm, first.sequence), (1.0, 1));
        assert_eq!((second.x_mm, second.sequence), (2.0, 2));
    }

    #[tokio::test]
    async fn connect_failures_retry_until_success() {
        let (store, mut rx, tx, stop) = harness();
        let sim = SimTransport::new()
            .with_connect_failure("radio busy")
            .with_connect_failure("radio busy")
            .with_sample(5.0, 5.0, 0.0);
        let probe = sim.probe();
        let session = RangingSession::new(
            fast_config("Rov1"),
            Box::new(sim),
            store,
            tx,
            Arc::clone(&stop),
        );
        let task = tokio::spawn(session.run());

        let sample = rx.recv().await.unwrap();
        stop.store(true, Ordering::SeqCst);
        task.await.unwrap();

        assert_eq!(sample.x_mm, 5.0);
        assert!(probe.connect_attempts() >= 3);
    }

    #[tokio::test]
    async fn link_loss_marks_error_then_reconnects() {
        let (store, mut rx, tx, stop) = harness();
        let sim = SimTransport::new()
            .with_sample(1.0, 1.0, 0.0)
            .with_link_lost("tag out of range")
            .with_sample(2.0, 2.0, 0.0);
        let session = RangingSession::new(
            fast_config("Rov1"),
            Box::new(sim),
            Arc::clone(&store),
            tx,
            Arc::clone(&stop),
        );
        let task = tokio::spawn(session.run());

        rx.recv().await.unwrap();
        // Sequence keeps counting across the reconnect.
        let after = rx.recv().await.unwrap();
        stop.store(true, Ordering::SeqCst);
        task.await.unwrap();

        assert_eq!(after.sequence, 2);
        assert_eq!(after.x_mm, 2.0);
    }

    #[tokio::test]
    async fn stop_flag_set_up_front_prevents_connect() {
        let (store, _rx, tx, stop) = harness();
        stop.store(true, Ordering::SeqCst);
        let sim = SimTransport::new().with_sample(1.0, 1.0, 0.0);
        let probe = sim.probe();
        let session = RangingSession::new(
            fast_config("Rov1"),
            Box::new(sim),
            Arc::clone(&store),
            tx,
            stop,
        );
        session.run().await;
        assert_eq!(probe.connect_attempts(), 0);
        assert_eq!(
            store.get("Rov1").unwrap().status,
            ConnectionStatus::Disconnected
        );
    }

    #[test]
    fn run_future_is_send() {
        // The session is spawned onto the runtime; its future must stay Send
        // even though the boxed transport is not Sync.
        fn require_send<T: Send>(_: &T) {}
        let (store, _rx, tx, stop) = harness();
        let session = RangingSession::new(
            fast_config("Rov1"),
            Box::new(SimTransport::new()),
            store,
            tx,
            stop,
        );
        require_send(&session.run());
    }

    #[tokio::test]
    async fn scan_miss_defers_connect() {
        let (store, _rx, tx, stop) = harness();
        let sim = SimTransport::new().with_sample(1.0, 1.0, 0.0);
        let probe = sim.probe();
        let session = RangingSession::new(
            fast_config("Rov1"),
            Box::new(sim),
            Arc::clone(&store),
            tx,
            Arc::clone(&stop),
        )
        .with_scanner(Box::new(SimScanner::new(Vec::new())));
        let task = tokio::spawn(session.run());

        tokio::time::sleep(Duration::from_millis(30)).await;
        stop.store(true, Ordering::SeqCst);
        task.await.unwrap();

        assert_eq!(probe.connect_attempts(), 0);
        assert_eq!(
            store.get("Rov1").unwrap().status,
            ConnectionStatus::Disconnected
        );
    }

    #[tokio::test]
    async fn advertised_device_proceeds_to_connect() {
        let (store, mut rx, tx, stop) = harness();
        let sim = SimTransport::new().with_sample(7.0, 7.0, 0.0);
        let session = RangingSession::new(
            fast_config("Rov1"),
            Box::new(sim),
            store,
            tx,
            Arc::clone(&stop),
        )
        .with_scanner(Box::new(SimScanner::new(vec![DeviceHandle {
            name: "Rov1-dwm".to_string(),
            address: "AA:01".to_string(),
        }])));
        let task = tokio::spawn(session.run());

        let sample = rx.recv().await.unwrap();
        stop.store(true, Ordering::SeqCst);
        task.await.unwrap();
        assert_eq!(sample.x_mm, 7.0);
    }

    #[tokio::test]
    async fn identity_match_reports_verified() {
        let (store, mut rx, tx, stop) = harness();
        let sim = SimTransport::new()
            .with_description("sim:RovB-7731")
            .with_sample(1.0, 1.0, 0.0);
        let session = RangingSession::new(
            fast_config("RovB").with_expected_identity("RovB-7731"),
            Box::new(sim),
            Arc::clone(&store),
            tx,
            Arc::clone(&stop),
        );
        let task = tokio::spawn(session.run());

        rx.recv().await.unwrap();
        let status = store.get("RovB").unwrap().status;
        stop.store(true, Ordering::SeqCst);
        task.await.unwrap();
        assert_eq!(status, ConnectionStatus::Verified);
    }
}
