//! [`MotionController`] – closed-loop waypoint pursuit.
//!
//! The controller consumes filtered position estimates and emits velocity
//! commands through the [`DriveActuator`] seam. Its lifecycle is a small
//! state machine:
//!
//! ```text
//! AwaitingFirstFix → Tracking → Arrived
//!                         └───→ Aborted   (boundary violation)
//! ```
//!
//! The first fix freezes the mission frame: the offset is the first fix
//! minus the plan's first waypoint, so the plan executes relative to where
//! the rover actually starts and the first waypoint is satisfied on the
//! spot. Boundary checks run on the raw arena-frame fix.
//!
//! [`ControlLoop`] wraps the controller in the 250 ms tick driven by
//! wall-clock `dt`, reading estimates from the telemetry store and honoring
//! the shared stop flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rovos_telemetry::TelemetryStore;
use rovos_types::{ControlError, Rgb, VelocityCommand, Waypoint};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::actuator::DriveActuator;
use crate::geometry::{angle_between, distance, wrap_degrees};
use crate::pid::PidController;
use crate::waypoint::WaypointPlan;

/// Lifecycle of one mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    AwaitingFirstFix,
    Tracking,
    Arrived,
    Aborted,
}

/// How the controller treats a reached waypoint.
///
/// `DiscreteWaypoint` settles (one zero-speed tick) at each waypoint before
/// pursuing the next; `ContinuousTrajectory` rolls straight through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    DiscreteWaypoint,
    ContinuousTrajectory,
}

/// Controller tunables.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub mode: ControlMode,
    /// Commanded speed when no distance PID is configured (0–100).
    pub base_speed: f64,
    /// Arena extent in millimetres; fixes outside
    /// `[margin, extent - margin]` on either axis abort the mission.
    pub arena_width_mm: f64,
    pub arena_height_mm: f64,
    pub boundary_margin_mm: f64,
    /// Steering PID gains (kp, ki, kd) on the heading error.
    pub steering_gains: (f64, f64, f64),
    /// Optional distance PID gains; when set, speed is the PID output on the
    /// remaining range, clamped to 0–100.
    pub distance_gains: Option<(f64, f64, f64)>,
    pub integral_limit: f64,
    /// Control tick period.
    pub tick: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            mode: ControlMode::DiscreteWaypoint,
            base_speed: 50.0,
            arena_width_mm: 10_000.0,
            arena_height_mm: 10_000.0,
            boundary_margin_mm: 10.0,
            steering_gains: (1.0, 0.0, 0.0),
            distance_gains: None,
            integral_limit: 100.0,
            tick: Duration::from_millis(250),
        }
    }
}

/// What one control tick did, for logs and the mission log.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub tick: u64,
    pub state: ControlState,
    /// Mission-frame position (relative to the frozen first fix).
    pub position: Option<(f64, f64)>,
    pub target: Option<Waypoint>,
    pub command: Option<VelocityCommand>,
    pub waypoint_index: usize,
}

/// The waypoint-pursuit state machine.
pub struct MotionController {
    config: ControllerConfig,
    plan: WaypointPlan,
    state: ControlState,
    frame_offset: Option<(f64, f64)>,
    steering: PidController,
    range: Option<PidController>,
    last_command: Option<VelocityCommand>,
    ticks: u64,
}

impl MotionController {
    pub fn new(config: ControllerConfig, plan: WaypointPlan) -> Self {
        let (kp, ki, kd) = config.steering_gains;
        let steering = PidController::new(kp, ki, kd).with_integral_limit(config.integral_limit);
        let range = config.distance_gains.map(|(kp, ki, kd)| {
            PidController::new(kp, ki, kd).with_integral_limit(config.integral_limit)
        });
        Self {
            config,
            plan,
            state: ControlState::AwaitingFirstFix,
            frame_offset: None,
            steering,
            range,
            last_command: None,
            ticks: 0,
        }
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    /// Mission-frame position for an arena-frame fix.
    ///
    /// # Errors
    ///
    /// [`ControlError::NoFix`] before the first fix has frozen the frame.
    pub fn relative_position(&self, fix: (f64, f64)) -> Result<(f64, f64), ControlError> {
        let (ox, oy) = self.frame_offset.ok_or(ControlError::NoFix)?;
        Ok((fix.0 - ox, fix.1 - oy))
    }

    /// Run one control step.
    ///
    /// Emits at most one velocity command; advances at most one waypoint.
    /// A boundary violation stops the drive, turns the indicator off, moves
    /// the state to `Aborted`, and returns the violation so the caller can
    /// release the session.
    pub fn tick(
        &mut self,
        fix: Option<(f64, f64)>,
        drive: &mut dyn DriveActuator,
        dt: f64,
    ) -> Result<TickReport, ControlError> {
        self.ticks += 1;
        if matches!(self.state, ControlState::Arrived | ControlState::Aborted) {
            return Ok(self.report(None, None, None));
        }

        let Some(raw) = fix else {
            // No estimate this tick: hold the previous command, or stay put.
            let command = self.last_command.unwrap_or_else(VelocityCommand::stop);
            drive.drive(&command)?;
            debug!(tick = self.ticks, "no fix, holding previous command");
            return Ok(self.report(None, None, Some(command)));
        };

        if self.frame_offset.is_none() {
            // Align the plan with the rover: at the first fix the rover sits
            // on the plan's first waypoint by definition.
            let (ax, ay) = self
                .plan
                .current()
                .map(|w| (w.x_mm, w.y_mm))
                .unwrap_or((0.0, 0.0));
            info!(x_mm = raw.0, y_mm = raw.1, "first fix, plan aligned to start pose");
            self.frame_offset = Some((raw.0 - ax, raw.1 - ay));
            self.state = ControlState::Tracking;
        }

        if self.out_of_bounds(raw) {
            warn!(x_mm = raw.0, y_mm = raw.1, "boundary violation, aborting");
            // Stop the chassis before anything else.
            drive.drive(&VelocityCommand::stop())?;
            drive.set_indicator(Rgb::OFF)?;
            self.state = ControlState::Aborted;
            self.last_command = None;
            return Err(ControlError::BoundaryViolation {
                x_mm: raw.0,
                y_mm: raw.1,
            });
        }

        let position = self.relative_position(raw)?;

        let Some(target) = self.plan.current().cloned() else {
            return self.arrive(drive, position);
        };

        let range_mm = distance(position, (target.x_mm, target.y_mm));
        if range_mm < target.tolerance_mm {
            info!(
                waypoint = self.plan.index(),
                range_mm, "waypoint reached"
            );
            drive.set_indicator(target.color)?;
            let next = self.plan.advance().cloned();
            match next {
                None => return self.arrive(drive, position),
                Some(next) => {
                    if self.config.mode == ControlMode::DiscreteWaypoint {
                        // Settle for one tick before pursuing the next target.
                        let command = VelocityCommand::stop();
                        drive.drive(&command)?;
                        self.last_command = Some(command);
                        return Ok(self.report(Some(position), Some(next), Some(command)));
                    }
                    return self.pursue(drive, position, next, dt);
                }
            }
        }

        self.pursue(drive, position, target, dt)
    }

    fn pursue(
        &mut self,
        drive: &mut dyn DriveActuator,
        position: (f64, f64),
        target: Waypoint,
        dt: f64,
    ) -> Result<TickReport, ControlError> {
        let desired = angle_between(position, (target.x_mm, target.y_mm));
        let measured = self
            .last_command
            .as_ref()
            .map(|c| c.heading_deg)
            .unwrap_or(desired);
        // Steer along the short way round: the set-point is the measured
        // heading plus the wrapped error.
        self.steering
            .set_set_point(measured + wrap_degrees(desired - measured));
        let correction = self.steering.update(measured, dt);
        let heading_deg = wrap_degrees(measured + correction);

        let range_mm = distance(position, (target.x_mm, target.y_mm));
        let speed = match &mut self.range {
            Some(pid) => {
                pid.set_set_point(0.0);
                pid.update(-range_mm, dt).clamp(0.0, 100.0)
            }
            None => self.config.base_speed,
        };

        let command = VelocityCommand {
            speed,
            heading_deg,
            rotation: 0.0,
        };
        drive.drive(&command)?;
        drive.set_indicator(target.color)?;
        self.last_command = Some(command);
        Ok(self.report(Some(position), Some(target), Some(command)))
    }

    fn arrive(
        &mut self,
        drive: &mut dyn DriveActuator,
        position: (f64, f64),
    ) -> Result<TickReport, ControlError> {
        info!(ticks = self.ticks, "plan complete, arrived");
        drive.drive(&VelocityCommand::stop())?;
        drive.set_indicator(Rgb::OFF)?;
        self.state = ControlState::Arrived;
        self.last_command = None;
        Ok(self.report(Some(position), None, Some(VelocityCommand::stop())))
    }

    fn out_of_bounds(&self, raw: (f64, f64)) -> bool {
        let m = self.config.boundary_margin_mm;
        raw.0 < m
            || raw.0 > self.config.arena_width_mm - m
            || raw.1 < m
            || raw.1 > self.config.arena_height_mm - m
    }

    fn report(
        &self,
        position: Option<(f64, f64)>,
        target: Option<Waypoint>,
        command: Option<VelocityCommand>,
    ) -> TickReport {
        TickReport {
            tick: self.ticks,
            state: self.state,
            position,
            target,
            command,
            waypoint_index: self.plan.index(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tick loop
// ---------------------------------------------------------------------------

/// Drives a [`MotionController`] on its tick period from telemetry-store
/// estimates until arrival, abort, or the shared stop flag.
pub struct ControlLoop {
    controller: MotionController,
    store: Arc<TelemetryStore>,
    device_id: String,
    stop: Arc<AtomicBool>,
}

impl ControlLoop {
    pub fn new(
        controller: MotionController,
        store: Arc<TelemetryStore>,
        device_id: impl Into<String>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            controller,
            store,
            device_id: device_id.into(),
            stop,
        }
    }

    /// Run to completion. `on_tick` sees every report (mission log hook).
    ///
    /// Arrival and abort both raise the stop flag to release the ranging
    /// session. On an external stop a final zero-speed command is emitted.
    pub async fn run<D, F>(mut self, drive: &mut D, mut on_tick: F) -> Result<ControlState, ControlError>
    where
        D: DriveActuator,
        F: FnMut(&TickReport),
    {
        let tick = self.controller.config.tick;
        let mut last = Instant::now();
        loop {
            if self.stop.load(Ordering::SeqCst) {
                drive.drive(&VelocityCommand::stop())?;
                info!(device = %self.device_id, "control loop released");
                return Ok(self.controller.state());
            }
            tokio::time::sleep(tick).await;
            let now = Instant::now();
            let dt = (now - last).as_secs_f64();
            last = now;

            let fix = self
                .store
                .get(&self.device_id)
                .and_then(|rec| rec.last_filtered);
            match self.controller.tick(fix, drive, dt) {
                Ok(report) => {
                    on_tick(&report);
                    if report.state == ControlState::Arrived {
                        self.stop.store(true, Ordering::SeqCst);
                        return Ok(ControlState::Arrived);
                    }
                }
                Err(err) => {
                    self.stop.store(true, Ordering::SeqCst);
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::SimDrive;
    use crate::waypoint::WaypointPlan;

    const DT: f64 = 0.25;

    fn wp(x: f64, y: f64, tol: f64) -> Waypoint {
        Waypoint {
            x_mm: x,
            y_mm: y,
            color: Rgb(0, 255, 0),
            tolerance_mm: tol,
        }
    }

    fn controller(waypoints: Vec<Waypoint>) -> MotionController {
        MotionController::new(ControllerConfig::default(), WaypointPlan::new(waypoints))
    }

    #[test]
    fn first_fix_freezes_the_mission_frame() {
        let mut ctl = controller(vec![wp(1000.0, 0.0, 100.0), wp(2000.0, 0.0, 100.0)]);
        let mut drive = SimDrive::new();
        assert_eq!(ctl.state(), ControlState::AwaitingFirstFix);

        // offset = fix - first waypoint = (4000, 5000); the first report sits
        // on the first waypoint.
        let report = ctl.tick(Some((5000.0, 5000.0)), &mut drive, DT).unwrap();
        assert_eq!(ctl.state(), ControlState::Tracking);
        assert_eq!(report.position, Some((1000.0, 0.0)));

        // A later fix is expressed in the same frozen frame.
        let report = ctl.tick(Some((5500.0, 5000.0)), &mut drive, DT).unwrap();
        assert_eq!(report.position, Some((1500.0, 0.0)));
    }

    #[test]
    fn first_waypoint_is_satisfied_at_the_first_fix() {
        // Wherever the rover actually starts, the plan is anchored there: the
        // first waypoint's absolute coordinates must not pull it sideways.
        let mut ctl = controller(vec![wp(1000.0, 1000.0, 100.0), wp(1000.0, 2000.0, 100.0)]);
        let mut drive = SimDrive::new();
        let report = ctl.tick(Some((5000.0, 5000.0)), &mut drive, DT).unwrap();
        assert_eq!(report.waypoint_index, 1);
        assert_eq!(drive.last_command().unwrap(), VelocityCommand::stop());

        // The next tick pursues the second waypoint, straight up.
        ctl.tick(Some((5000.0, 5000.0)), &mut drive, DT).unwrap();
        let cmd = drive.last_command().unwrap();
        assert_eq!(cmd.heading_deg, 90.0);
        assert_eq!(cmd.speed, 50.0);
    }

    #[test]
    fn tracking_drives_toward_the_target() {
        let mut ctl = controller(vec![wp(0.0, 0.0, 100.0), wp(1000.0, 1000.0, 100.0)]);
        let mut drive = SimDrive::new();
        // First tick settles on the start waypoint; the second pursues.
        ctl.tick(Some((5000.0, 5000.0)), &mut drive, DT).unwrap();
        ctl.tick(Some((5000.0, 5000.0)), &mut drive, DT).unwrap();
        let cmd = drive.last_command().unwrap();
        assert_eq!(cmd.speed, 50.0);
        assert_eq!(cmd.heading_deg, 45.0);
        assert_eq!(drive.colors().last(), Some(&Rgb(0, 255, 0)));
    }

    #[test]
    fn no_fix_holds_the_previous_command() {
        let mut ctl = controller(vec![wp(0.0, 0.0, 100.0), wp(1000.0, 0.0, 100.0)]);
        let mut drive = SimDrive::new();
        // Before any fix a missing estimate means stay put.
        ctl.tick(None, &mut drive, DT).unwrap();
        assert_eq!(drive.last_command().unwrap().speed, 0.0);

        ctl.tick(Some((5000.0, 5000.0)), &mut drive, DT).unwrap();
        ctl.tick(Some((5000.0, 5000.0)), &mut drive, DT).unwrap();
        let driving = drive.last_command().unwrap();
        assert!(driving.speed > 0.0);
        ctl.tick(None, &mut drive, DT).unwrap();
        assert_eq!(drive.last_command().unwrap(), driving);
    }

    #[test]
    fn waypoint_index_is_monotonic_and_advances_at_most_one_per_tick() {
        let mut ctl = controller(vec![
            wp(0.0, 0.0, 100.0),
            wp(0.0, 0.0, 100.0),
            wp(1000.0, 0.0, 100.0),
        ]);
        let mut drive = SimDrive::new();
        let mut last_index = 0;
        // The fix sits on top of the first two waypoints; even so the plan
        // must advance one waypoint per tick at most.
        for _ in 0..4 {
            let report = ctl.tick(Some((5000.0, 5000.0)), &mut drive, DT).unwrap();
            assert!(report.waypoint_index >= last_index);
            assert!(report.waypoint_index - last_index <= 1);
            last_index = report.waypoint_index;
        }
        assert_eq!(last_index, 2);
    }

    #[test]
    fn boundary_violation_stops_the_drive_first() {
        let mut ctl = controller(vec![wp(0.0, 0.0, 100.0), wp(1000.0, 0.0, 100.0)]);
        let mut drive = SimDrive::new();
        ctl.tick(Some((5000.0, 5000.0)), &mut drive, DT).unwrap();

        let err = ctl
            .tick(Some((5.0, 5000.0)), &mut drive, DT)
            .unwrap_err();
        assert!(matches!(err, ControlError::BoundaryViolation { .. }));
        assert_eq!(ctl.state(), ControlState::Aborted);
        assert_eq!(drive.last_command().unwrap(), VelocityCommand::stop());
        assert_eq!(drive.colors().last(), Some(&Rgb::OFF));

        // Once aborted the controller stays silent.
        let before = drive.commands().len();
        let report = ctl.tick(Some((5000.0, 5000.0)), &mut drive, DT).unwrap();
        assert_eq!(report.state, ControlState::Aborted);
        assert_eq!(drive.commands().len(), before);
    }

    #[test]
    fn completing_the_plan_arrives_and_stops() {
        let mut ctl = controller(vec![wp(0.0, 0.0, 100.0)]);
        let mut drive = SimDrive::new();
        let report = ctl.tick(Some((5000.0, 5000.0)), &mut drive, DT).unwrap();
        assert_eq!(report.state, ControlState::Arrived);
        assert_eq!(drive.last_command().unwrap(), VelocityCommand::stop());
        assert_eq!(drive.colors().last(), Some(&Rgb::OFF));
    }

    #[test]
    fn discrete_mode_settles_one_tick_at_each_waypoint() {
        let mut ctl = controller(vec![wp(0.0, 0.0, 100.0), wp(1000.0, 0.0, 100.0)]);
        let mut drive = SimDrive::new();
        let report = ctl.tick(Some((5000.0, 5000.0)), &mut drive, DT).unwrap();
        assert_eq!(report.waypoint_index, 1);
        assert_eq!(drive.last_command().unwrap().speed, 0.0);

        // Next tick pursues the second waypoint.
        ctl.tick(Some((5000.0, 5000.0)), &mut drive, DT).unwrap();
        assert!(drive.last_command().unwrap().speed > 0.0);
    }

    #[test]
    fn continuous_mode_rolls_through_waypoints() {
        let config = ControllerConfig {
            mode: ControlMode::ContinuousTrajectory,
            ..ControllerConfig::default()
        };
        let plan = WaypointPlan::new(vec![wp(0.0, 0.0, 100.0), wp(1000.0, 0.0, 100.0)]);
        let mut ctl = MotionController::new(config, plan);
        let mut drive = SimDrive::new();
        let report = ctl.tick(Some((5000.0, 5000.0)), &mut drive, DT).unwrap();
        assert_eq!(report.waypoint_index, 1);
        let cmd = drive.last_command().unwrap();
        assert!(cmd.speed > 0.0);
        assert_eq!(cmd.heading_deg, 0.0);
    }

    #[test]
    fn distance_pid_scales_speed_with_range() {
        let config = ControllerConfig {
            distance_gains: Some((0.01, 0.0, 0.0)),
            ..ControllerConfig::default()
        };
        let plan = WaypointPlan::new(vec![wp(0.0, 0.0, 100.0), wp(1000.0, 0.0, 100.0)]);
        let mut ctl = MotionController::new(config, plan);
        let mut drive = SimDrive::new();
        ctl.tick(Some((5000.0, 5000.0)), &mut drive, DT).unwrap();
        // Range 1000 mm, kp 0.01: speed = 10.
        ctl.tick(Some((5000.0, 5000.0)), &mut drive, DT).unwrap();
        assert!((drive.last_command().unwrap().speed - 10.0).abs() < 1e-9);
    }

    #[test]
    fn distance_pid_speed_is_clamped_to_command_range() {
        let config = ControllerConfig {
            distance_gains: Some((10.0, 0.0, 0.0)),
            ..ControllerConfig::default()
        };
        let plan = WaypointPlan::new(vec![wp(0.0, 0.0, 100.0), wp(4000.0, 0.0, 100.0)]);
        let mut ctl = MotionController::new(config, plan);
        let mut drive = SimDrive::new();
        ctl.tick(Some((5000.0, 5000.0)), &mut drive, DT).unwrap();
        ctl.tick(Some((5000.0, 5000.0)), &mut drive, DT).unwrap();
        assert_eq!(drive.last_command().unwrap().speed, 100.0);
    }

    #[test]
    fn steering_takes_the_short_way_round() {
        let mut ctl = controller(vec![wp(0.0, 0.0, 10.0), wp(-1000.0, -100.0, 10.0)]);
        let mut drive = SimDrive::new();
        // Settle on the start waypoint, then pursue a target just below the
        // -X axis: desired heading near -174°.
        ctl.tick(Some((5000.0, 5000.0)), &mut drive, DT).unwrap();
        ctl.tick(Some((5000.0, 5000.0)), &mut drive, DT).unwrap();
        let first = drive.last_command().unwrap().heading_deg;
        assert!(first < -170.0);
        // The rover drifts below the target; desired flips to near +174°.
        // The command must cross the ±180° seam, not unwind through 0.
        ctl.tick(Some((5000.0, 4800.0)), &mut drive, DT).unwrap();
        let second = drive.last_command().unwrap().heading_deg;
        assert!((-180.0..=180.0).contains(&second));
        assert!(second > 170.0);
    }

    #[tokio::test]
    async fn control_loop_arrives_and_raises_the_stop_flag() {
        let store = Arc::new(TelemetryStore::new());
        store.publish_raw(rovos_types::DeviceSample {
            device_id: "Rov1".to_string(),
            x_mm: 5000.0,
            y_mm: 5000.0,
            z_mm: 0.0,
            timestamp: chrono::Utc::now(),
            sequence: 1,
        });
        store.publish_filtered("Rov1", (5000.0, 5000.0));

        let config = ControllerConfig {
            tick: Duration::from_millis(5),
            ..ControllerConfig::default()
        };
        let plan = WaypointPlan::new(vec![wp(0.0, 0.0, 100.0)]);
        let stop = Arc::new(AtomicBool::new(false));
        let control = ControlLoop::new(
            MotionController::new(config, plan),
            Arc::clone(&store),
            "Rov1",
            Arc::clone(&stop),
        );

        let mut drive = SimDrive::new();
        let mut reports = Vec::new();
        let state = control
            .run(&mut drive, |r| reports.push(r.clone()))
            .await
            .unwrap();

        assert_eq!(state, ControlState::Arrived);
        assert!(stop.load(Ordering::SeqCst));
        assert_eq!(reports.last().unwrap().state, ControlState::Arrived);
        assert_eq!(drive.last_command().unwrap(), VelocityCommand::stop());
    }

    #[tokio::test]
    async fn external_stop_emits_a_final_zero_speed_command() {
        let store = Arc::new(TelemetryStore::new());
        let config = ControllerConfig {
            tick: Duration::from_millis(5),
            ..ControllerConfig::default()
        };
        let plan = WaypointPlan::new(vec![wp(1000.0, 0.0, 100.0)]);
        let stop = Arc::new(AtomicBool::new(true));
        let control = ControlLoop::new(
            MotionController::new(config, plan),
            store,
            "Rov1",
            Arc::clone(&stop),
        );

        let mut drive = SimDrive::new();
        let state = control.run(&mut drive, |_| {}).await.unwrap();
        assert_eq!(state, ControlState::AwaitingFirstFix);
        assert_eq!(drive.commands(), vec![VelocityCommand::stop()]);
    }
}
