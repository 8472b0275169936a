//! `rovos-control` – closed-loop motion control.
//!
//! Turns filtered position estimates into chassis velocity commands:
//!
//! - [`pid`] – the generic PID controller used for steering and range.
//! - [`geometry`] – heading/distance helpers (degrees, millimetres).
//! - [`waypoint`] – [`WaypointPlan`][waypoint::WaypointPlan] and
//!   choreography-row ingestion.
//! - [`actuator`] – the [`DriveActuator`][actuator::DriveActuator] seam and
//!   its simulated stand-in.
//! - [`controller`] – the [`MotionController`][controller::MotionController]
//!   state machine and the [`ControlLoop`][controller::ControlLoop] tick.

pub mod actuator;
pub mod controller;
pub mod geometry;
pub mod pid;
pub mod waypoint;

pub use actuator::{DriveActuator, SimDrive};
pub use controller::{ControlLoop, ControlMode, ControlState, ControllerConfig, MotionController, TickReport};
pub use pid::PidController;
pub use waypoint::{ChoreoRow, WaypointPlan};
