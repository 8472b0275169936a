//! Outlier-rejecting sliding-window average.
//!
//! Every incoming sample is z-scored against the window (including itself,
//! population standard deviation). Samples beyond the threshold are kept in
//! the window history, so a rover that genuinely jumps re-admits itself once
//! enough readings land in the new region, but they are excluded from the
//! reported average, and the update that rejected them returns the previous
//! average unchanged.

use std::collections::VecDeque;

use tracing::debug;

/// Default window capacity.
pub const DEFAULT_WINDOW: usize = 10;
/// Default z-score rejection threshold.
pub const DEFAULT_TAU: f64 = 3.0;

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: f64,
    accepted: bool,
}

/// Sliding-window mean with z-score outlier rejection.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    window: usize,
    tau: f64,
    entries: VecDeque<Entry>,
    last_output: Option<f64>,
}

impl MovingAverage {
    /// Create a filter with the given window capacity and z-score threshold.
    pub fn new(window: usize, tau: f64) -> Self {
        Self {
            window: window.max(1),
            tau,
            entries: VecDeque::with_capacity(window.max(1) + 1),
            last_output: None,
        }
    }

    /// Number of samples currently held, outliers included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Feed one sample and return the current average.
    ///
    /// The z-score is evaluated over the window *including* the new sample,
    /// before the oldest entry is evicted. A zero standard deviation yields
    /// z = 0, i.e. no rejection is possible on a constant window.
    pub fn update(&mut self, value: f64) -> f64 {
        self.entries.push_back(Entry {
            value,
            accepted: true,
        });

        let mean = self.window_mean();
        let std = self.window_std(mean);
        let z = if std == 0.0 { 0.0 } else { (value - mean) / std };

        let output = if z.abs() > self.tau {
            // Keep the sample in history but out of the average.
            if let Some(entry) = self.entries.back_mut() {
                entry.accepted = false;
            }
            debug!(value, z, tau = self.tau, "rejected outlier sample");
            self.last_output.unwrap_or(value)
        } else {
            let avg = self.accepted_mean().unwrap_or(value);
            self.last_output = Some(avg);
            avg
        };

        if self.entries.len() > self.window {
            self.entries.pop_front();
        }

        output
    }

    fn window_mean(&self) -> f64 {
        let sum: f64 = self.entries.iter().map(|e| e.value).sum();
        sum / self.entries.len() as f64
    }

    /// Population standard deviation over the whole window.
    fn window_std(&self, mean: f64) -> f64 {
        let var: f64 = self
            .entries
            .iter()
            .map(|e| (e.value - mean).powi(2))
            .sum::<f64>()
            / self.entries.len() as f64;
        var.sqrt()
    }

    fn accepted_mean(&self) -> Option<f64> {
        let (sum, n) = self
            .entries
            .iter()
            .filter(|e| e.accepted)
            .fold((0.0, 0usize), |(s, n), e| (s + e.value, n + 1));
        if n == 0 { None } else { Some(sum / n as f64) }
    }
}

impl Default for MovingAverage {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_TAU)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warmed(value: f64, n: usize) -> MovingAverage {
        let mut ma = MovingAverage::default();
        for _ in 0..n {
            ma.update(value);
        }
        ma
    }

    #[test]
    fn constant_input_yields_constant_average() {
        let mut ma = MovingAverage::default();
        for _ in 0..20 {
            assert_eq!(ma.update(10.0), 10.0);
        }
    }

    #[test]
    fn spike_is_rejected_on_warmed_window() {
        let mut ma = warmed(10.0, 10);
        // A 10x spike against a full window of tens: |z| > 3.
        let out = ma.update(100.0);
        assert_eq!(out, 10.0, "rejected sample must not move the average");
    }

    #[test]
    fn average_stays_clean_after_rejection() {
        let mut ma = warmed(10.0, 10);
        ma.update(100.0);
        // The spike sits in history but not in the average.
        let out = ma.update(10.0);
        assert!((out - 10.0).abs() < 1e-9);
    }

    #[test]
    fn short_window_cannot_reject() {
        // A 2-element window can never exceed |z| = 1, so even a wild second
        // sample is accepted.
        let mut ma = MovingAverage::new(10, 3.0);
        ma.update(5.0);
        let out = ma.update(50.0);
        assert!((out - 27.5).abs() < 1e-9);
    }

    #[test]
    fn first_sample_passes_through() {
        let mut ma = MovingAverage::default();
        assert_eq!(ma.update(42.0), 42.0);
        assert_eq!(ma.len(), 1);
    }

    #[test]
    fn window_evicts_oldest() {
        let mut ma = MovingAverage::new(3, 100.0);
        ma.update(1.0);
        ma.update(2.0);
        ma.update(3.0);
        // [2, 3, 4] after eviction.
        let out = ma.update(4.0);
        assert_eq!(ma.len(), 3);
        assert!((out - 3.0).abs() < 1e-9);
    }

    #[test]
    fn sustained_jump_readmits_itself() {
        let mut ma = warmed(10.0, 10);
        // Keep feeding the new level; once the window fills with it the
        // z-score shrinks and the average follows the rover.
        let mut last = 0.0;
        for _ in 0..30 {
            last = ma.update(100.0);
        }
        assert!((last - 100.0).abs() < 1e-6, "average must converge, got {last}");
    }
}
