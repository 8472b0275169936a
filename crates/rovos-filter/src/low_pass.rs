//! First-order exponential low-pass filter.
//!
//! `y_t = α·x_t + (1 − α)·y_{t−1}`, seeded with the first sample.

/// Default smoothing coefficient.
pub const DEFAULT_ALPHA: f64 = 0.1;

/// Exponential low-pass filter over a scalar signal.
#[derive(Debug, Clone)]
pub struct LowPass {
    alpha: f64,
    state: Option<f64>,
}

impl LowPass {
    /// Create a filter with coefficient `alpha` (clamped to `[0, 1]`).
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            state: None,
        }
    }

    /// Feed one sample and return the filtered value.
    pub fn update(&mut self, value: f64) -> f64 {
        let next = match self.state {
            None => value,
            Some(prev) => self.alpha * value + (1.0 - self.alpha) * prev,
        };
        self.state = Some(next);
        next
    }

    /// Forget all history.
    pub fn reset(&mut self) {
        self.state = None;
    }
}

impl Default for LowPass {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}
