//! Scripted transport and scanner for headless tests and hardware-free runs.
//!
//! [`SimTransport`] replays a scripted sequence of connect outcomes and
//! readings, so the full acquisition stack can be exercised in CI without a
//! radio. A cloneable [`SimProbe`] exposes attempt counters to tests after
//! the transport has been boxed away inside a session.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rovos_types::RadioError;

use crate::transport::{DeviceHandle, DeviceScanner, RangingTransport, RawPosition};

#[derive(Debug, Default)]
struct ProbeState {
    connect_attempts: usize,
    disconnects: usize,
}

/// Shared counters for asserting on a [`SimTransport`] from the outside.
#[derive(Debug, Clone, Default)]
pub struct SimProbe(Arc<Mutex<ProbeState>>);

impl SimProbe {
    pub fn connect_attempts(&self) -> usize {
        self.0.lock().expect("probe lock poisoned").connect_attempts
    }

    pub fn disconnects(&self) -> usize {
        self.0.lock().expect("probe lock poisoned").disconnects
    }
}

/// Scripted [`RangingTransport`].
///
/// Connect attempts consume scripted failures first and succeed once the
/// failure script is exhausted. Reads consume scripted events in order; once
/// exhausted, every further read reports a lost link after a short pause.
pub struct SimTransport {
    connect_failures: Mutex<VecDeque<String>>,
    events: Mutex<VecDeque<Result<RawPosition, RadioError>>>,
    description: String,
    /// Pause before each scripted event, to mimic a real sample rate.
    interval: Duration,
    probe: SimProbe,
}

impl SimTransport {
    pub fn new() -> Self {
        Self {
            connect_failures: Mutex::new(VecDeque::new()),
            events: Mutex::new(VecDeque::new()),
            description: "sim:scripted".to_string(),
            interval: Duration::ZERO,
            probe: SimProbe::default(),
        }
    }

    /// Pace scripted events at `interval` instead of replaying instantly.
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Queue one failed connect attempt.
    pub fn with_connect_failure(self, details: impl Into<String>) -> Self {
        self.connect_failures
            .lock()
            .expect("sim lock poisoned")
            .push_back(details.into());
        self
    }

    /// Queue one good reading (millimetres).
    pub fn with_sample(self, x_mm: f64, y_mm: f64, z_mm: f64) -> Self {
        self.push_event(Ok(RawPosition { x_mm, y_mm, z_mm }));
        self
    }

    /// Queue one recoverable protocol error.
    pub fn with_malformed(self, details: impl Into<String>) -> Self {
        self.push_event(Err(RadioError::ReadMalformed(details.into())));
        self
    }

    /// Queue one fatal link drop.
    pub fn with_link_lost(self, details: impl Into<String>) -> Self {
        self.push_event(Err(RadioError::LinkLost(details.into())));
        self
    }

    /// Override the link description reported by [`RangingTransport::describe`].
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Counters shared with this transport.
    pub fn probe(&self) -> SimProbe {
        self.probe.clone()
    }

    fn push_event(&self, event: Result<RawPosition, RadioError>) {
        self.events
            .lock()
            .expect("sim lock poisoned")
            .push_back(event);
    }
}

impl Default for SimTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RangingTransport for SimTransport {
    async fn connect(&mut self) -> Result<(), RadioError> {
        self.probe.0.lock().expect("probe lock poisoned").connect_attempts += 1;
        let failure = self
            .connect_failures
            .lock()
            .expect("sim lock poisoned")
            .pop_front();
        match failure {
            Some(details) => Err(RadioError::ConnectFailed {
                device: self.description.clone(),
                details,
            }),
            None => Ok(()),
        }
    }

    async fn read_sample(&mut self) -> Result<RawPosition, RadioError> {
        if !self.interval.is_zero() {
            tokio::time::sleep(self.interval).await;
        }
        let event = self.events.lock().expect("sim lock poisoned").pop_front();
        match event {
            Some(event) => event,
            None => {
                // Keep an exhausted script from spinning the reconnect loop.
                tokio::time::sleep(Duration::from_millis(5)).await;
                Err(RadioError::LinkLost("script exhausted".to_string()))
            }
        }
    }

    async fn disconnect(&mut self) {
        self.probe.0.lock().expect("probe lock poisoned").disconnects += 1;
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

/// Scripted [`DeviceScanner`] returning a fixed set of advertisements.
pub struct SimScanner {
    advertised: Vec<DeviceHandle>,
}

impl SimScanner {
    pub fn new(advertised: Vec<DeviceHandle>) -> Self {
        Self { advertised }
    }
}

#[async_trait]
impl DeviceScanner for SimScanner {
    async fn scan(
        &mut self,
        name_filter: &str,
        _timeout: Duration,
    ) -> Result<Option<DeviceHandle>, RadioError> {
        Ok(self
            .advertised
            .iter()
            .find(|d| d.name.contains(name_filter))
            .cloned())
    }
}
