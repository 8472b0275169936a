//! `rovos-radio` – ranging-session management.
//!
//! Owns the radio link to one UWB device and turns its readings into
//! [`DeviceSample`][rovos_types::DeviceSample]s published to the telemetry
//! store. The session is polymorphic over the physical transport:
//!
//! - [`frame`] – bit-exact decoder for the BLE location characteristic
//!   payload.
//! - [`serial`] – framed ASCII protocol of the serial UWB module
//!   (`DIST,…,POS,x,y,z,quality`).
//! - [`transport`] – the [`RangingTransport`][transport::RangingTransport]
//!   seam plus the BLE and serial implementations over injectable links.
//! - [`session`] – [`RangingSession`][session::RangingSession]:
//!   advertisement gate, connect-with-retry, read loop, status transitions,
//!   teardown.
//! - [`sim`] – scripted transport and scanner for tests and hardware-free
//!   runs.

pub mod frame;
pub mod serial;
pub mod session;
pub mod sim;
pub mod transport;

pub use session::{RangingSession, SessionConfig};
pub use transport::{DeviceHandle, DeviceScanner, RangingTransport, RawPosition};
