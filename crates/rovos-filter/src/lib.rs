//! `rovos-filter` – the position-smoothing pipeline.
//!
//! Turns noisy raw UWB samples into a stable 2-D estimate by cascading up to
//! four per-axis stages, each usable on its own:
//!
//! - [`moving_average`] – [`MovingAverage`][moving_average::MovingAverage]:
//!   sliding-window mean with z-score outlier rejection.
//! - [`low_pass`] – [`LowPass`][low_pass::LowPass]: first-order exponential
//!   low-pass filter.
//! - [`savgol`] – [`SavitzkyGolay`][savgol::SavitzkyGolay]: polynomial
//!   least-squares smoothing over a trailing window.
//! - [`kalman`] – [`Kalman1D`][kalman::Kalman1D]: constant-velocity Kalman
//!   filter, one instance per axis.
//! - [`chain`] – [`FilterChain`][chain::FilterChain]: composes the stages in
//!   a fixed order with each stage optional, so the deployed configurations
//!   (full cascade, or moving-average straight into Kalman) are both a
//!   builder call away.

pub mod chain;
pub mod kalman;
pub mod low_pass;
pub mod moving_average;
pub mod savgol;

pub use chain::{FilterChain, FilterChainBuilder};
pub use kalman::Kalman1D;
pub use low_pass::LowPass;
pub use moving_average::MovingAverage;
pub use savgol::SavitzkyGolay;
