//! Configuration – reads `rovos.toml` with `ROVOS_*` env overrides.
//!
//! Every field carries a serde default so a minimal file (or none at all)
//! yields a runnable sim configuration.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use rovos_control::{ChoreoRow, ControlMode, ControllerConfig, WaypointPlan};
use rovos_coordinator::RosterEntry;
use rovos_filter::FilterChain;
use serde::{Deserialize, Serialize};

/// Which radio backend the rover node drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Scripted transport, no hardware required.
    #[default]
    Sim,
    /// Serial UWB module on a pre-configured tty.
    Serial,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Sim => write!(f, "sim"),
            Transport::Serial => write!(f, "serial"),
        }
    }
}

/// Which smoothing cascade the filter pump runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilterPreset {
    /// Moving average → low-pass → Savitzky–Golay → Kalman.
    #[default]
    Full,
    /// Moving average → Kalman.
    Averaged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FilterConfig {
    #[serde(default)]
    pub preset: FilterPreset,
}

/// Console log rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    /// Newline-delimited JSON, for log shippers.
    Json,
}

/// The `[log]` section: console format and optional OTLP span export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LogConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// OTLP collector base URL, e.g. `http://localhost:4318`. Spans are only
    /// exported when set.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    /// `"discrete"` settles at each waypoint; `"continuous"` rolls through.
    #[serde(default = "default_control_mode")]
    pub mode: String,
    #[serde(default = "default_base_speed")]
    pub base_speed: f64,
    #[serde(default = "default_arena_mm")]
    pub arena_width_mm: f64,
    #[serde(default = "default_arena_mm")]
    pub arena_height_mm: f64,
    #[serde(default = "default_margin_mm")]
    pub boundary_margin_mm: f64,
    #[serde(default = "default_steering_kp")]
    pub steering_kp: f64,
    #[serde(default)]
    pub steering_ki: f64,
    #[serde(default)]
    pub steering_kd: f64,
    /// When set, speed comes from a PID on the remaining range instead of
    /// `base_speed`.
    #[serde(default)]
    pub distance_kp: Option<f64>,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_tolerance_mm")]
    pub waypoint_tolerance_mm: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            mode: default_control_mode(),
            base_speed: default_base_speed(),
            arena_width_mm: default_arena_mm(),
            arena_height_mm: default_arena_mm(),
            boundary_margin_mm: default_margin_mm(),
            steering_kp: default_steering_kp(),
            steering_ki: 0.0,
            steering_kd: 0.0,
            distance_kp: None,
            tick_ms: default_tick_ms(),
            waypoint_tolerance_mm: default_tolerance_mm(),
        }
    }
}

/// One `[[waypoints]]` row: choreography coordinates in metres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaypointConfig {
    #[serde(default)]
    pub time_ms: u64,
    pub x_m: f64,
    pub y_m: f64,
    #[serde(default)]
    pub red: u8,
    #[serde(default)]
    pub green: u8,
    #[serde(default)]
    pub blue: u8,
}

/// One `[[roster]]` row for coordinator mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterConfig {
    pub id: String,
    pub ip: String,
    pub port: u16,
}

/// Top-level `rovos.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_device_id")]
    pub device_id: String,
    #[serde(default)]
    pub transport: Transport,
    #[serde(default = "default_serial_port")]
    pub serial_port: String,
    /// When set, the ranging link must identify itself with this string for
    /// the session to report `Verified` instead of plain `Connected`.
    #[serde(default)]
    pub expected_identity: Option<String>,
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,
    /// Path of the SQLite mission log.
    #[serde(default = "default_log_db")]
    pub log_db: String,
    /// Start ranging at boot instead of waiting for `start_connection`.
    #[serde(default = "default_autostart")]
    pub autostart_ranging: bool,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub waypoints: Vec<WaypointConfig>,
    #[serde(default)]
    pub roster: Vec<RosterConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
            transport: Transport::default(),
            serial_port: default_serial_port(),
            expected_identity: None,
            rpc_port: default_rpc_port(),
            log_db: default_log_db(),
            autostart_ranging: default_autostart(),
            log: LogConfig::default(),
            filter: FilterConfig::default(),
            control: ControlConfig::default(),
            waypoints: Vec::new(),
            roster: Vec::new(),
        }
    }
}

fn default_device_id() -> String {
    "Rov1".to_string()
}
fn default_serial_port() -> String {
    "/dev/ttyACM0".to_string()
}
fn default_rpc_port() -> u16 {
    9091
}
fn default_log_db() -> String {
    "rovos.db".to_string()
}
fn default_autostart() -> bool {
    true
}
fn default_control_mode() -> String {
    "discrete".to_string()
}
fn default_base_speed() -> f64 {
    50.0
}
fn default_arena_mm() -> f64 {
    10_000.0
}
fn default_margin_mm() -> f64 {
    10.0
}
fn default_steering_kp() -> f64 {
    1.0
}
fn default_tick_ms() -> u64 {
    250
}
fn default_tolerance_mm() -> f64 {
    100.0
}

impl Config {
    /// Build the motion-controller tunables from the `[control]` section.
    pub fn controller_config(&self) -> ControllerConfig {
        let mode = match self.control.mode.as_str() {
            "continuous" => ControlMode::ContinuousTrajectory,
            _ => ControlMode::DiscreteWaypoint,
        };
        ControllerConfig {
            mode,
            base_speed: self.control.base_speed,
            arena_width_mm: self.control.arena_width_mm,
            arena_height_mm: self.control.arena_height_mm,
            boundary_margin_mm: self.control.boundary_margin_mm,
            steering_gains: (
                self.control.steering_kp,
                self.control.steering_ki,
                self.control.steering_kd,
            ),
            distance_gains: self.control.distance_kp.map(|kp| (kp, 0.0, 0.0)),
            tick: Duration::from_millis(self.control.tick_ms),
            ..ControllerConfig::default()
        }
    }

    /// Build the configured smoothing cascade.
    pub fn filter_chain(&self) -> FilterChain {
        match self.filter.preset {
            FilterPreset::Full => FilterChain::full(),
            FilterPreset::Averaged => FilterChain::averaged(),
        }
    }

    /// Build the waypoint plan from the `[[waypoints]]` rows.
    pub fn plan(&self) -> WaypointPlan {
        let rows: Vec<ChoreoRow> = self
            .waypoints
            .iter()
            .map(|w| ChoreoRow {
                time_ms: w.time_ms,
                x_m: w.x_m,
                y_m: w.y_m,
                red: w.red,
                green: w.green,
                blue: w.blue,
            })
            .collect();
        WaypointPlan::from_rows(&rows, self.control.waypoint_tolerance_mm)
    }

    /// The fleet roster for coordinator mode.
    pub fn roster(&self) -> Vec<RosterEntry> {
        self.roster
            .iter()
            .map(|r| RosterEntry {
                id: r.id.clone(),
                ip: r.ip.clone(),
                port: r.port,
            })
            .collect()
    }
}

/// The config path: `ROVOS_CONFIG` when set, else `./rovos.toml`.
pub fn config_path() -> PathBuf {
    std::env::var("ROVOS_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("rovos.toml"))
}

/// Load the config. Returns `None` when the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {e}"))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `ROVOS_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ROVOS_DEVICE_ID` | `device_id` |
/// | `ROVOS_RPC_PORT` | `rpc_port` |
/// | `ROVOS_SERIAL_PORT` | `serial_port` |
/// | `ROVOS_LOG_DB` | `log_db` |
/// | `ROVOS_LOG_FORMAT=json` | `log.format` |
/// | `OTEL_EXPORTER_OTLP_ENDPOINT` | `log.otlp_endpoint` (file wins when both are set) |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("ROVOS_DEVICE_ID") {
        cfg.device_id = v;
    }
    if let Ok(v) = std::env::var("ROVOS_RPC_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.rpc_port = port;
    }
    if let Ok(v) = std::env::var("ROVOS_SERIAL_PORT") {
        cfg.serial_port = v;
    }
    if let Ok(v) = std::env::var("ROVOS_LOG_DB") {
        cfg.log_db = v;
    }
    if let Ok(v) = std::env::var("ROVOS_LOG_FORMAT") {
        cfg.log.format = if v == "json" {
            LogFormat::Json
        } else {
            LogFormat::Text
        };
    }
    if cfg.log.otlp_endpoint.is_none()
        && let Ok(v) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
    {
        cfg.log.otlp_endpoint = Some(v);
    }
}
