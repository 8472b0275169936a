//! [`WaypointPlan`] – the ordered target list for one mission.
//!
//! Plans are built either directly from [`Waypoint`]s or from choreography
//! rows (`time_ms, x_m, y_m, red, green, blue`), whose coordinates are in
//! metres and are converted to canonical millimetres exactly once, here.
//! The cursor only ever moves forward and only the motion controller moves
//! it.

use rovos_types::{Rgb, Waypoint};

/// Default arrival tolerance applied to choreography rows.
pub const DEFAULT_TOLERANCE_MM: f64 = 100.0;

/// One row of an ingested choreography table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChoreoRow {
    pub time_ms: u64,
    pub x_m: f64,
    pub y_m: f64,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

/// Ordered waypoint list with a forward-only cursor.
#[derive(Debug, Clone)]
pub struct WaypointPlan {
    waypoints: Vec<Waypoint>,
    cursor: usize,
}

impl WaypointPlan {
    pub fn new(waypoints: Vec<Waypoint>) -> Self {
        Self {
            waypoints,
            cursor: 0,
        }
    }

    /// Build a plan from choreography rows, ordered by `time_ms`.
    /// Coordinates are metres and become millimetres here.
    pub fn from_rows(rows: &[ChoreoRow], tolerance_mm: f64) -> Self {
        let mut rows: Vec<ChoreoRow> = rows.to_vec();
        rows.sort_by_key(|r| r.time_ms);
        let waypoints = rows
            .into_iter()
            .map(|r| Waypoint {
                x_mm: r.x_m * 1000.0,
                y_mm: r.y_m * 1000.0,
                color: Rgb(r.red, r.green, r.blue),
                tolerance_mm,
            })
            .collect();
        Self::new(waypoints)
    }

    /// The waypoint currently being pursued, or `None` when the plan is
    /// complete.
    pub fn current(&self) -> Option<&Waypoint> {
        self.waypoints.get(self.cursor)
    }

    /// Move the cursor to the next waypoint and return it.
    pub fn advance(&mut self) -> Option<&Waypoint> {
        if self.cursor < self.waypoints.len() {
            self.cursor += 1;
        }
        self.current()
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.waypoints.len()
    }

    /// Zero-based index of the current waypoint.
    pub fn index(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }
}
