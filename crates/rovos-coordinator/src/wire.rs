//! RPC wire format: one JSON object per line, both directions.
//!
//! Requests are tagged by `op`, responses by `result`. Unknown or unparsable
//! frames are answered with an error frame; the connection stays up.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp layout used in coordinate reports, microsecond precision.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// A client-to-rover request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Begin ranging for the given device. Safe to repeat.
    StartConnection { device_id: String },
    /// Fetch the rover's latest position estimate.
    GetCoordinates,
}

/// Position answer for [`Request::GetCoordinates`]. Coordinates are
/// millimetres; the filtered estimate is reported when the chain has warmed
/// up, the raw reading otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateReport {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Formatted with [`TIMESTAMP_FORMAT`].
    pub timestamp: String,
    pub status: String,
}

/// A rover-to-client response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Response {
    Ack {
        device_id: String,
        already_running: bool,
    },
    Coordinates(CoordinateReport),
    Error {
        message: String,
    },
}
