//! The drive actuator seam.
//!
//! The motion controller never talks to a chassis directly: it emits
//! [`VelocityCommand`]s and indicator colors through this trait, and the
//! binary wires in whatever backend the platform provides. [`SimDrive`]
//! records everything it is told for assertions in tests.

use std::sync::{Arc, Mutex};

use rovos_types::{ControlError, Rgb, VelocityCommand};

/// Chassis-level output: velocity and the indicator lamp.
pub trait DriveActuator: Send {
    fn drive(&mut self, command: &VelocityCommand) -> Result<(), ControlError>;
    fn set_indicator(&mut self, color: Rgb) -> Result<(), ControlError>;
}

#[derive(Debug, Default)]
struct DriveLog {
    commands: Vec<VelocityCommand>,
    colors: Vec<Rgb>,
}

/// A simulated drive that records the most recent commands. Always succeeds.
#[derive(Debug, Clone, Default)]
pub struct SimDrive {
    log: Arc<Mutex<DriveLog>>,
}

impl SimDrive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every velocity command received, in order.
    pub fn commands(&self) -> Vec<VelocityCommand> {
        self.log.lock().expect("drive log poisoned").commands.clone()
    }

    /// Every indicator color received, in order.
    pub fn colors(&self) -> Vec<Rgb> {
        self.log.lock().expect("drive log poisoned").colors.clone()
    }

    pub fn last_command(&self) -> Option<VelocityCommand> {
        self.log
            .lock()
            .expect("drive log poisoned")
            .commands
            .last()
            .copied()
    }
}

impl DriveActuator for SimDrive {
    fn drive(&mut self, command: &VelocityCommand) -> Result<(), ControlError> {
        self.log
            .lock()
            .expect("drive log poisoned")
            .commands
            .push(*command);
        Ok(())
    }

    fn set_indicator(&mut self, color: Rgb) -> Result<(), ControlError> {
        self.log.lock().expect("drive log poisoned").colors.push(color);
        Ok(())
    }
}
