//! `rovos-coordinator` – fleet RPC plumbing.
//!
//! Each rover runs a [`RoverServer`] exposing `start_connection` and
//! `get_coordinates` over a JSON-lines TCP protocol; the base station runs a
//! [`SwarmCoordinator`] that polls every rover on the roster into a shared
//! [`SwarmView`]. Rovers fail independently: a timeout on one entry never
//! delays or poisons another.

pub mod client;
pub mod server;
pub mod swarm;
pub mod wire;

pub use client::{DEFAULT_RPC_TIMEOUT, RoverClient};
pub use server::{RoverServer, SessionLauncher};
pub use swarm::{RosterEntry, SwarmCoordinator, SwarmEntry, SwarmView};
pub use wire::{CoordinateReport, Request, Response, TIMESTAMP_FORMAT};
