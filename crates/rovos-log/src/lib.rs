//! `rovos-log` – SQLite-backed mission log.
//!
//! Persists one row per control tick so a finished run can be replayed and
//! analysed offline. Rows are keyed by `(mission_id, tick)`; a mission id is
//! a UUID minted when the run starts.
//!
//! # Storage layout
//!
//! A single table `mission_ticks`:
//!
//! | column         | type    | description                           |
//! |----------------|---------|---------------------------------------|
//! | mission_id     | TEXT    | UUID v4 of the run                    |
//! | tick           | INTEGER | Control-tick counter within the run   |
//! | timestamp      | TEXT    | RFC-3339 wall-clock time (UTC)        |
//! | device_id      | TEXT    | Rover the tick belongs to             |
//! | state          | TEXT    | Controller state label                |
//! | pos_x_mm/_y_mm | REAL    | Mission-frame position, NULL if no fix|
//! | target_x_mm/_y_mm | REAL | Pursued waypoint, NULL when arrived   |
//! | speed          | REAL    | Commanded speed, NULL if no command   |
//! | heading_deg    | REAL    | Commanded heading, NULL if no command |
//! | waypoint_index | INTEGER | Plan cursor at the end of the tick    |

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};
use uuid::Uuid;

/// Errors arising from mission-log operations.
#[derive(Error, Debug)]
pub enum MissionLogError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// One persisted control tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    pub mission_id: Uuid,
    pub tick: u64,
    pub timestamp: DateTime<Utc>,
    pub device_id: String,
    pub state: String,
    pub position: Option<(f64, f64)>,
    pub target: Option<(f64, f64)>,
    pub speed: Option<f64>,
    pub heading_deg: Option<f64>,
    pub waypoint_index: u64,
}

/// SQLite-backed store of [`TickRecord`]s.
pub struct MissionLog {
    conn: Connection,
}

impl MissionLog {
    /// Open (or create) a persistent database at `path`.
    pub fn open(path: &str) -> Result<Self, MissionLogError> {
        let conn = Connection::open(path)?;
        let log = Self { conn };
        log.init_schema()?;
        debug!(path, "mission log open");
        Ok(log)
    }

    /// Open a temporary in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, MissionLogError> {
        let conn = Connection::open_in_memory()?;
        let log = Self { conn };
        log.init_schema()?;
        Ok(log)
    }

    fn init_schema(&self) -> Result<(), MissionLogError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS mission_ticks (
                mission_id     TEXT    NOT NULL,
                tick           INTEGER NOT NULL,
                timestamp      TEXT    NOT NULL,
                device_id      TEXT    NOT NULL,
                state          TEXT    NOT NULL,
                pos_x_mm       REAL,
                pos_y_mm       REAL,
                target_x_mm    REAL,
                target_y_mm    REAL,
                speed          REAL,
                heading_deg    REAL,
                waypoint_index INTEGER NOT NULL,
                PRIMARY KEY (mission_id, tick)
            );",
        )?;
        Ok(())
    }

    /// Persist one tick. Re-recording the same `(mission_id, tick)` replaces
    /// the earlier row.
    pub fn record_tick(&self, record: &TickRecord) -> Result<(), MissionLogError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO mission_ticks
                 (mission_id, tick, timestamp, device_id, state,
                  pos_x_mm, pos_y_mm, target_x_mm, target_y_mm,
                  speed, heading_deg, waypoint_index)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.mission_id.to_string(),
                record.tick as i64,
                record.timestamp.to_rfc3339(),
                record.device_id,
                record.state,
                record.position.map(|p| p.0),
                record.position.map(|p| p.1),
                record.target.map(|t| t.0),
                record.target.map(|t| t.1),
                record.speed,
                record.heading_deg,
                record.waypoint_index as i64,
            ],
        )?;
        trace!(
            mission = %record.mission_id,
            tick = record.tick,
            state = %record.state,
            "tick persisted"
        );
        Ok(())
    }

    /// The most recent `limit` ticks of one mission, newest first.
    pub fn recent(&self, mission_id: Uuid, limit: usize) -> Result<Vec<TickRecord>, MissionLogError> {
        let mut stmt = self.conn.prepare(
            "SELECT mission_id, tick, timestamp, device_id, state,
                    pos_x_mm, pos_y_mm, target_x_mm, target_y_mm,
                    speed, heading_deg, waypoint_index
             FROM mission_ticks
             WHERE mission_id = ?1
             ORDER BY tick DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![mission_id.to_string(), limit as i64], |row| {
            let mission: String = row.get(0)?;
            let tick: i64 = row.get(1)?;
            let ts: String = row.get(2)?;
            let device_id: String = row.get(3)?;
            let state: String = row.get(4)?;
            let pos_x: Option<f64> = row.get(5)?;
            let pos_y: Option<f64> = row.get(6)?;
            let target_x: Option<f64> = row.get(7)?;
            let target_y: Option<f64> = row.get(8)?;
            let speed: Option<f64> = row.get(9)?;
            let heading_deg: Option<f64> = row.get(10)?;
            let waypoint_index: i64 = row.get(11)?;
            Ok((
                mission, tick, ts, device_id, state, pos_x, pos_y, target_x, target_y, speed,
                heading_deg, waypoint_index,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (mission, tick, ts, device_id, state, pos_x, pos_y, target_x, target_y, speed, heading_deg, waypoint_index) =
                row?;
            let mission_id = Uuid::parse_str(&mission).map_err(|e| {
                rusqlite::Error::InvalidColumnType(0, e.to_string(), rusqlite::types::Type::Text)
            })?;
            let timestamp = ts.parse::<DateTime<Utc>>().map_err(|e| {
                rusqlite::Error::InvalidColumnType(2, e.to_string(), rusqlite::types::Type::Text)
            })?;
            records.push(TickRecord {
                mission_id,
                tick: tick as u64,
                timestamp,
                device_id,
                state,
                position: pos_x.zip(pos_y),
                target: target_x.zip(target_y),
                speed,
                heading_deg,
                waypoint_index: waypoint_index as u64,
            });
        }
        Ok(records)
    }

    /// Every mission id present in the log.
    pub fn missions(&self) -> Result<Vec<Uuid>, MissionLogError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT mission_id FROM mission_ticks ORDER BY mission_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            let raw = row?;
            let id = Uuid::parse_str(&raw).map_err(|e| {
                rusqlite::Error::InvalidColumnType(0, e.to_string(), rusqlite::types::Type::Text)
            })?;
            ids.push(id);
        }
        Ok(ids)
    }
}
