//! Constant-velocity Kalman filter, one dimension per instance.
//!
//! State is `[position, velocity]` with
//!
//! ```text
//! F = | 1 1 |    H = | 1 0 |    P₀ = 1000·I    Q = I    R = 5
//!     | 0 1 |
//! ```
//!
//! applied independently to the x and y axes by the chain.

/// Default measurement noise.
pub const DEFAULT_R: f64 = 5.0;
/// Default initial covariance scale.
pub const DEFAULT_P0: f64 = 1000.0;

/// 1-D constant-velocity Kalman filter.
#[derive(Debug, Clone)]
pub struct Kalman1D {
    /// State estimate `[position, velocity]`.
    x: [f64; 2],
    /// Covariance, row-major 2×2.
    p: [[f64; 2]; 2],
    /// Process noise (diagonal).
    q: f64,
    /// Measurement noise.
    r: f64,
}

impl Kalman1D {
    /// Filter with the pipeline's standard tuning.
    pub fn new() -> Self {
        Self::with_noise(1.0, DEFAULT_R)
    }

    /// Filter with explicit process / measurement noise.
    pub fn with_noise(q: f64, r: f64) -> Self {
        Self {
            x: [0.0, 0.0],
            p: [[DEFAULT_P0, 0.0], [0.0, DEFAULT_P0]],
            q,
            r,
        }
    }

    /// Run one predict/update cycle against measurement `z` and return the
    /// position estimate.
    pub fn update(&mut self, z: f64) -> f64 {
        // Predict: x = F·x, P = F·P·Fᵀ + Q.
        self.x = [self.x[0] + self.x[1], self.x[1]];
        let [[p00, p01], [p10, p11]] = self.p;
        self.p = [
            [p00 + p10 + p01 + p11 + self.q, p01 + p11],
            [p10 + p11, p11 + self.q],
        ];

        // Update: y = z − H·x, S = H·P·Hᵀ + R, K = P·Hᵀ/S.
        let y = z - self.x[0];
        let s = self.p[0][0] + self.r;
        let k = [self.p[0][0] / s, self.p[1][0] / s];

        self.x = [self.x[0] + k[0] * y, self.x[1] + k[1] * y];

        // P = (I − K·H)·P.
        let [[p00, p01], [p10, p11]] = self.p;
        self.p = [
            [(1.0 - k[0]) * p00, (1.0 - k[0]) * p01],
            [p10 - k[1] * p00, p11 - k[1] * p01],
        ];

        self.x[0]
    }

    /// Current position estimate.
    pub fn position(&self) -> f64 {
        self.x[0]
    }

    /// Current velocity estimate.
    pub fn velocity(&self) -> f64 {
        self.x[1]
    }
}

impl Default for Kalman1D {
    fn default() -> Self {
        Self::new()
    }
}
