//! `rovos-telemetry` – the shared device-state map.
//!
//! [`TelemetryStore`] is the single shared mutable structure in the stack:
//! ranging sessions write raw samples and status transitions into it, the
//! filter pump writes smoothed estimates, and the motion controller and RPC
//! server read copies out of it. Everything else is message passing.

pub mod store;

pub use store::TelemetryStore;
