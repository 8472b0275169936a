//! Generic PID (Proportional–Integral–Derivative) controller.
//!
//! The controller computes a corrective output that drives a measured value
//! toward a desired set-point. It is deliberately hardware-agnostic: the
//! caller supplies the measurement and elapsed time and applies the output
//! to whatever it is steering.

/// A tunable PID controller for closed-loop feedback control.
///
/// The integral accumulator is only touched when the integral gain is
/// non-zero, so a P-only or PD controller carries no hidden state between
/// gain changes. The previous error starts at zero, so the first update sees
/// a full `error / dt` derivative kick.
#[derive(Debug, Clone)]
pub struct PidController {
    kp: f64,
    ki: f64,
    kd: f64,
    set_point: f64,
    integral: f64,
    integral_limit: f64,
    last_error: f64,
}

impl PidController {
    /// Create a new controller with the given gains and no integral clamp.
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            set_point: 0.0,
            integral: 0.0,
            integral_limit: f64::INFINITY,
            last_error: 0.0,
        }
    }

    /// Clamp the integral accumulator to `±limit` (anti-windup).
    pub fn with_integral_limit(mut self, limit: f64) -> Self {
        self.integral_limit = limit.abs();
        self
    }

    /// Change the desired set-point value.
    pub fn set_set_point(&mut self, set_point: f64) {
        self.set_point = set_point;
    }

    pub fn set_point(&self) -> f64 {
        self.set_point
    }

    /// Current integral accumulator value.
    pub fn integral(&self) -> f64 {
        self.integral
    }

    /// Compute the next controller output.
    ///
    /// - `measurement` – the current measured value of the process variable.
    /// - `dt` – elapsed time since the last call, in seconds (must be > 0).
    ///
    /// Returns `0.0` without updating internal state if `dt` is not positive.
    pub fn update(&mut self, measurement: f64, dt: f64) -> f64 {
        if dt <= 0.0 {
            return 0.0;
        }

        let error = self.set_point - measurement;

        let p = self.kp * error;

        let i = if self.ki != 0.0 {
            self.integral =
                (self.integral + error * dt).clamp(-self.integral_limit, self.integral_limit);
            self.ki * self.integral
        } else {
            0.0
        };

        let d = self.kd * (error - self.last_error) / dt;
        self.last_error = error;

        p + i + d
    }

    /// Reset internal state (integral accumulator and derivative memory).
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = 0.0;
    }
}
