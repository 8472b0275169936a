//! Savitzky–Golay smoothing.
//!
//! Fits a least-squares polynomial of the configured order over the trailing
//! window of samples and evaluates it at the newest point. This matches
//! taking the last element of a whole-buffer Savitzky–Golay pass with
//! polynomial edge handling, which is how the pipeline consumes it: one
//! smoothed value per incoming sample.
//!
//! Until more than `window` samples have been seen the input value is passed
//! through unchanged.

use std::collections::VecDeque;

/// Default window length.
pub const DEFAULT_WINDOW: usize = 11;
/// Default polynomial order.
pub const DEFAULT_ORDER: usize = 2;

/// Trailing-window Savitzky–Golay smoother.
#[derive(Debug, Clone)]
pub struct SavitzkyGolay {
    window: usize,
    order: usize,
    buffer: VecDeque<f64>,
    seen: usize,
}

impl SavitzkyGolay {
    /// Create a smoother with the given window length and polynomial order.
    /// The order is capped at `window − 1` so the fit is never underdetermined.
    pub fn new(window: usize, order: usize) -> Self {
        let window = window.max(2);
        Self {
            window,
            order: order.min(window - 1),
            buffer: VecDeque::with_capacity(window),
            seen: 0,
        }
    }

    /// Feed one sample; returns the smoothed value, or the sample itself
    /// while warming up.
    pub fn update(&mut self, value: f64) -> f64 {
        self.seen += 1;
        self.buffer.push_back(value);
        if self.buffer.len() > self.window {
            self.buffer.pop_front();
        }
        if self.seen <= self.window {
            return value;
        }
        let values: Vec<f64> = self.buffer.iter().copied().collect();
        fit_endpoint(&values, self.order)
    }
}

impl Default for SavitzkyGolay {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_ORDER)
    }
}

/// Least-squares polynomial fit of `values` against t = 0..n−1, evaluated at
/// t = n−1. Falls back to the raw endpoint if the normal equations turn out
/// singular (constant inputs keep it well conditioned in practice).
fn fit_endpoint(values: &[f64], order: usize) -> f64 {
    let n = values.len();
    let m = order + 1;

    // Normal equations A·c = b with A[i][j] = Σ t^(i+j), b[i] = Σ y·t^i.
    let mut a = vec![vec![0.0; m]; m];
    let mut b = vec![0.0; m];
    for (t, &y) in values.iter().enumerate() {
        let t = t as f64;
        let mut pow = 1.0;
        let mut powers = Vec::with_capacity(2 * m - 1);
        for _ in 0..(2 * m - 1) {
            powers.push(pow);
            pow *= t;
        }
        for i in 0..m {
            b[i] += y * powers[i];
            for j in 0..m {
                a[i][j] += powers[i + j];
            }
        }
    }

    let Some(coeffs) = solve(&mut a, &mut b) else {
        return values[n - 1];
    };

    let t_end = (n - 1) as f64;
    let mut acc = 0.0;
    let mut pow = 1.0;
    for c in coeffs {
        acc += c * pow;
        pow *= t_end;
    }
    acc
}

/// Gaussian elimination with partial pivoting. Returns `None` on a
/// (numerically) singular system.
fn solve(a: &mut [Vec<f64>], b: &mut [f64]) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut acc = b[row];
        for k in (row + 1)..n {
            acc -= a[row][k] * x[k];
        }
        x[row] = acc / a[row][row];
    }
    Some(x)
}
