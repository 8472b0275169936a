use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One raw UWB position reading from a ranging device.
///
/// Samples are immutable: a session produces exactly one per successful read
/// and never mutates it afterwards. Coordinates are **millimetres**, the
/// canonical unit of the whole pipeline, pinned at the transport boundary
/// (serial modules report metres and are converted on ingestion).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSample {
    /// Stable device identifier, e.g. `"Rov2"`.
    pub device_id: String,
    pub x_mm: f64,
    pub y_mm: f64,
    pub z_mm: f64,
    /// Wall-clock time the sample was read off the radio.
    pub timestamp: DateTime<Utc>,
    /// Monotonic per-session arrival counter.
    pub sequence: u64,
}

/// Link state of a ranging session. Only the owning session transitions it;
/// everyone else reads it for display and decision logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    /// Connected and the rover passed its identity check.
    Verified,
    Error,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Connecting => "Connecting",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Verified => "Verified",
            ConnectionStatus::Error => "Error",
        };
        write!(f, "{s}")
    }
}

/// Latest known state of one device, as held by the telemetry store.
///
/// Records are overwritten whole on each new sample (last-writer-wins) and
/// handed to consumers as copies, never as live references into the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub device_id: String,
    pub last_raw: DeviceSample,
    /// Smoothed (x, y) in millimetres, `None` while the filter warms up.
    pub last_filtered: Option<(f64, f64)>,
    pub status: ConnectionStatus,
    /// When this record was last written.
    pub updated_at: DateTime<Utc>,
}

impl TelemetryRecord {
    /// Age of this record relative to `now`. Negative clock skew clamps to zero.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.updated_at).max(chrono::Duration::zero())
    }
}

/// Chassis velocity command handed to the drive-train collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocityCommand {
    /// Translation speed, 0–100.
    pub speed: f64,
    /// Travel direction in degrees.
    pub heading_deg: f64,
    /// Rotation rate; the choreography always drives with 0.
    pub rotation: f64,
}

impl VelocityCommand {
    /// All-zero command. Emitted on arrival, abort, and shutdown.
    pub fn stop() -> Self {
        Self {
            speed: 0.0,
            heading_deg: 0.0,
            rotation: 0.0,
        }
    }
}

/// RGB indicator colour for the rover's LEDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const OFF: Rgb = Rgb(0, 0, 0);
}

/// One target position in a choreography sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub x_mm: f64,
    pub y_mm: f64,
    pub color: Rgb,
    pub tolerance_mm: f64,
}

/// Radio-link failures. `ReadMalformed` is always recoverable (log and skip);
/// the connect/link variants surface only as a `ConnectionStatus` transition.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RadioError {
    #[error("scan timed out after {timeout_secs}s without matching \"{name_filter}\"")]
    ScanTimeout {
        name_filter: String,
        timeout_secs: u64,
    },
    #[error("failed to connect to {device}: {details}")]
    ConnectFailed { device: String, details: String },
    #[error("malformed frame: {0}")]
    ReadMalformed(String),
    #[error("link lost: {0}")]
    LinkLost(String),
}

/// Coordinator RPC failures. These mark one rover's entry stale and are
/// never re-raised into the aggregation loop.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcError {
    #[error("RPC call timed out after {0} ms")]
    Timeout(u64),
    #[error("connection refused by {0}")]
    Refused(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Motion-control failures. `BoundaryViolation` aborts the current mission
/// (after a stop command) but never the process.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlError {
    #[error("no filtered position fix available yet")]
    NoFix,
    #[error("position ({x_mm}, {y_mm}) left the play area boundary")]
    BoundaryViolation { x_mm: f64, y_mm: f64 },
    #[error("drive actuator fault: {0}")]
    Actuator(String),
}
