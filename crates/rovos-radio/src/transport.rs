//! The transport seam.
//!
//! A [`RangingSession`][crate::session::RangingSession] never talks to a
//! radio directly: it drives a [`RangingTransport`], and the transport
//! translates between the device's protocol and [`RawPosition`] values in
//! canonical millimetres. Two implementations ship here, BLE characteristic
//! polling and the serial UWB line protocol, both over injectable link
//! traits so they can be exercised without hardware.

use std::time::Duration;

use async_trait::async_trait;
use rovos_types::RadioError;
use tracing::debug;

use crate::frame;
use crate::serial;

/// One decoded position reading, always in millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPosition {
    pub x_mm: f64,
    pub y_mm: f64,
    pub z_mm: f64,
}

/// A device found during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    pub name: String,
    pub address: String,
}

/// Passive advertisement scanning. First name match wins; there is no
/// ranking among candidates.
#[async_trait]
pub trait DeviceScanner: Send {
    /// Collect advertisements for `timeout` and return the first device
    /// whose name contains `name_filter`, or `None` when nothing matched.
    async fn scan(
        &mut self,
        name_filter: &str,
        timeout: Duration,
    ) -> Result<Option<DeviceHandle>, RadioError>;
}

/// A connected ranging link producing position readings.
///
/// `read_sample` may suspend until the device has data. Implementations
/// surface protocol damage as [`RadioError::ReadMalformed`] (recoverable,
/// the session logs and continues) and dead links as
/// [`RadioError::LinkLost`] (the session reconnects).
#[async_trait]
pub trait RangingTransport: Send {
    async fn connect(&mut self) -> Result<(), RadioError>;
    async fn read_sample(&mut self) -> Result<RawPosition, RadioError>;
    async fn disconnect(&mut self);
    /// Human-readable link description for logs, e.g. `"ble:DC:0D:…"`.
    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// BLE characteristic transport
// ---------------------------------------------------------------------------

/// Low-level BLE operations the platform stack must provide.
#[async_trait]
pub trait BleLink: Send {
    async fn connect(&mut self) -> Result<(), RadioError>;
    async fn read_characteristic(&mut self, uuid: &str) -> Result<Vec<u8>, RadioError>;
    async fn disconnect(&mut self);
    fn address(&self) -> String;
}

/// [`RangingTransport`] that polls the location characteristic of a BLE tag
/// and decodes its fixed-layout frame.
pub struct BleTransport {
    link: Box<dyn BleLink>,
    /// Pause between characteristic reads; the tag refreshes at ~20 Hz.
    poll_interval: Duration,
}

impl BleTransport {
    pub fn new(link: Box<dyn BleLink>) -> Self {
        Self {
            link,
            poll_interval: Duration::from_millis(50),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[async_trait]
impl RangingTransport for BleTransport {
    async fn connect(&mut self) -> Result<(), RadioError> {
        self.link.connect().await
    }

    async fn read_sample(&mut self) -> Result<RawPosition, RadioError> {
        tokio::time::sleep(self.poll_interval).await;
        let payload = self.link.read_characteristic(frame::LOC_DATA_UUID).await?;
        frame::decode_location_frame(&payload)
    }

    async fn disconnect(&mut self) {
        self.link.disconnect().await;
    }

    fn describe(&self) -> String {
        format!("ble:{}", self.link.address())
    }
}

// ---------------------------------------------------------------------------
// Serial UWB transport
// ---------------------------------------------------------------------------

/// Line-oriented serial I/O the platform must provide.
#[async_trait]
pub trait LineIo: Send {
    /// Read the next line, or `None` when nothing is waiting yet.
    async fn read_line(&mut self) -> Result<Option<String>, RadioError>;
    async fn write_command(&mut self, bytes: &[u8]) -> Result<(), RadioError>;
    fn port(&self) -> String;
}

/// [`RangingTransport`] over the serial UWB module's ASCII shell.
pub struct SerialUwbTransport {
    io: Box<dyn LineIo>,
}

impl SerialUwbTransport {
    pub fn new(io: Box<dyn LineIo>) -> Self {
        Self { io }
    }
}

#[async_trait]
impl RangingTransport for SerialUwbTransport {
    async fn connect(&mut self) -> Result<(), RadioError> {
        // Two carriage returns wake the UART shell.
        self.io.write_command(serial::SHELL_WAKE).await?;
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.io.write_command(serial::SHELL_WAKE).await?;
        debug!(port = %self.io.port(), "serial shell mode active");
        Ok(())
    }

    async fn read_sample(&mut self) -> Result<RawPosition, RadioError> {
        loop {
            let Some(line) = self.io.read_line().await? else {
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            };
            if line.trim() == serial::SHELL_PROMPT {
                self.io.write_command(serial::LEC_COMMAND).await?;
                continue;
            }
            // A malformed POS section propagates; the session logs and
            // retries. Everything else is chatter to skip.
            if let Some(pos) = serial::parse_dist_line(&line)? {
                return Ok(pos);
            }
        }
    }

    async fn disconnect(&mut self) {
        // Nothing to tear down; dropping the port handle closes it.
    }

    fn describe(&self) -> String {
        format!("serial:{}", self.io.port())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use std::sync::{Arc, Mutex};

    struct ScriptedIo {
        lines: VecDeque<Option<String>>,
        commands: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    #[async_trait]
    impl LineIo for ScriptedIo {
        async fn read_line(&mut self) -> Result<Option<String>, RadioError> {
            match self.lines.pop_front() {
                Some(line) => Ok(line),
                None => Err(RadioError::LinkLost("script exhausted".to_string())),
            }
        }

        async fn write_command(&mut self, bytes: &[u8]) -> Result<(), RadioError> {
            self.commands.lock().unwrap().push(bytes.to_vec());
            Ok(())
        }

        fn port(&self) -> String {
            "/dev/ttyTEST".to_string()
        }
    }

    fn scripted_with_log(
        lines: &[&str],
        commands: Arc<Mutex<Vec<Vec<u8>>>>,
    ) -> SerialUwbTransport {
        SerialUwbTransport::new(Box::new(ScriptedIo {
            lines: lines.iter().map(|l| Some(l.to_string())).collect(),
            commands,
        }))
    }

    fn scripted(lines: &[&str]) -> SerialUwbTransport {
        scripted_with_log(lines, Arc::default())
    }

    #[tokio::test]
    async fn serial_transport_returns_first_position() {
        let mut t = scripted(&[
            "INF,booted",
            "DIST,2,AN0,0F32,1.0,2.0,0.0,1.25",
            "DIST,4,POS,1.50,0.75,0.00,90",
        ]);
        let pos = t.read_sample().await.unwrap();
        assert_eq!(pos.x_mm, 1500.0);
        assert_eq!(pos.y_mm, 750.0);
    }

    #[tokio::test]
    async fn serial_prompt_triggers_lec_request() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut t = scripted_with_log(
            &["dwm>", "DIST,4,POS,1.0,1.0,0.0,90"],
            Arc::clone(&log),
        );
        t.read_sample().await.unwrap();
        assert_eq!(log.lock().unwrap().as_slice(), &[serial::LEC_COMMAND.to_vec()]);
    }

    #[tokio::test]
    async fn serial_malformed_pos_propagates() {
        let mut t = scripted(&["DIST,4,POS,not-a-number,1.0,0.0,90"]);
        let err = t.read_sample().await.unwrap_err();
        assert!(matches!(err, RadioError::ReadMalformed(_)));
    }

    #[tokio::test]
    async fn serial_link_loss_propagates() {
        let mut t = scripted(&[]);
        let err = t.read_sample().await.unwrap_err();
        assert!(matches!(err, RadioError::LinkLost(_)));
    }

    #[tokio::test]
    async fn serial_connect_wakes_shell_twice() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut t = scripted_with_log(&[], Arc::clone(&log));
        t.connect().await.unwrap();
        let written = log.lock().unwrap();
        assert_eq!(written.len(), 2);
        assert!(written.iter().all(|w| w == serial::SHELL_WAKE));
    }
}
