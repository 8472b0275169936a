//! [`FilterChain`] – the composed per-device smoothing pipeline.
//!
//! One chain instance owns the full filter state for one device: a pair of
//! per-axis stage cascades applied in the fixed order
//!
//! ```text
//! moving average → low-pass → Savitzky–Golay → Kalman
//! ```
//!
//! with every stage optional. The two configurations deployed in the field
//! (the full cascade on raw samples, and the moving average feeding the
//! Kalman filter directly) are both built from the same
//! [`FilterChainBuilder`].
//!
//! Chain state lives and dies with its ranging session; it is never shared
//! and never persisted, so a session restart starts the warm-up over (an
//! accepted discontinuity).

use rovos_types::DeviceSample;

use crate::kalman::Kalman1D;
use crate::low_pass::LowPass;
use crate::moving_average::MovingAverage;
use crate::savgol::SavitzkyGolay;

/// Per-axis cascade of optional stages.
#[derive(Debug, Clone, Default)]
struct AxisChain {
    moving_average: Option<MovingAverage>,
    low_pass: Option<LowPass>,
    savgol: Option<SavitzkyGolay>,
    kalman: Option<Kalman1D>,
}

impl AxisChain {
    fn update(&mut self, raw: f64) -> f64 {
        let mut v = raw;
        if let Some(ma) = &mut self.moving_average {
            v = ma.update(v);
        }
        if let Some(lp) = &mut self.low_pass {
            v = lp.update(v);
        }
        if let Some(sg) = &mut self.savgol {
            v = sg.update(v);
        }
        if let Some(kf) = &mut self.kalman {
            v = kf.update(v);
        }
        v
    }
}

/// Builder for a [`FilterChain`]. Stages are applied in declaration order
/// regardless of the order the `with_*` calls are made in.
#[derive(Debug, Clone, Default)]
pub struct FilterChainBuilder {
    moving_average: Option<(usize, f64)>,
    low_pass: Option<f64>,
    savgol: Option<(usize, usize)>,
    kalman: bool,
    warmup: Option<u64>,
}

impl FilterChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable the outlier-rejecting moving average (`window`, z threshold).
    pub fn with_moving_average(mut self, window: usize, tau: f64) -> Self {
        self.moving_average = Some((window, tau));
        self
    }

    /// Enable the exponential low-pass stage.
    pub fn with_low_pass(mut self, alpha: f64) -> Self {
        self.low_pass = Some(alpha);
        self
    }

    /// Enable Savitzky–Golay smoothing (`window`, polynomial order).
    pub fn with_savgol(mut self, window: usize, order: usize) -> Self {
        self.savgol = Some((window, order));
        self
    }

    /// Enable the constant-velocity Kalman stage.
    pub fn with_kalman(mut self) -> Self {
        self.kalman = true;
        self
    }

    /// Override the number of raw samples consumed before the chain starts
    /// producing estimates. Defaults to the moving-average window when that
    /// stage is enabled, else 1.
    pub fn warmup_samples(mut self, samples: u64) -> Self {
        self.warmup = Some(samples);
        self
    }

    pub fn build(self) -> FilterChain {
        let warmup = self.warmup.unwrap_or(match self.moving_average {
            Some((window, _)) => window as u64,
            None => 1,
        });
        let make_axis = || AxisChain {
            moving_average: self.moving_average.map(|(w, t)| MovingAverage::new(w, t)),
            low_pass: self.low_pass.map(LowPass::new),
            savgol: self.savgol.map(|(w, o)| SavitzkyGolay::new(w, o)),
            kalman: self.kalman.then(Kalman1D::new),
        };
        FilterChain {
            x: make_axis(),
            y: make_axis(),
            seen: 0,
            warmup: warmup.max(1),
        }
    }
}

/// The composed 2-D smoothing pipeline for one device.
#[derive(Debug, Clone)]
pub struct FilterChain {
    x: AxisChain,
    y: AxisChain,
    seen: u64,
    warmup: u64,
}

impl FilterChain {
    pub fn builder() -> FilterChainBuilder {
        FilterChainBuilder::new()
    }

    /// The full cascade applied to raw samples: outlier-rejecting moving
    /// average, low-pass, Savitzky–Golay, then Kalman.
    pub fn full() -> Self {
        FilterChainBuilder::new()
            .with_moving_average(
                crate::moving_average::DEFAULT_WINDOW,
                crate::moving_average::DEFAULT_TAU,
            )
            .with_low_pass(crate::low_pass::DEFAULT_ALPHA)
            .with_savgol(crate::savgol::DEFAULT_WINDOW, crate::savgol::DEFAULT_ORDER)
            .with_kalman()
            .build()
    }

    /// The lighter configuration: moving average straight into the Kalman
    /// filter, no low-pass or Savitzky–Golay stage.
    pub fn averaged() -> Self {
        FilterChainBuilder::new()
            .with_moving_average(
                crate::moving_average::DEFAULT_WINDOW,
                crate::moving_average::DEFAULT_TAU,
            )
            .with_kalman()
            .build()
    }

    /// Feed one raw sample; returns the smoothed `(x, y)` in millimetres, or
    /// `None` while warming up.
    pub fn update(&mut self, sample: &DeviceSample) -> Option<(f64, f64)> {
        self.seen += 1;
        let fx = self.x.update(sample.x_mm);
        let fy = self.y.update(sample.y_mm);
        if self.seen < self.warmup {
            None
        } else {
            Some((fx, fy))
        }
    }

    /// Raw samples consumed so far.
    pub fn samples_seen(&self) -> u64 {
        self.seen
    }
}
