// src/peripherals/motor.rs

use crate::error::PeripheralError;
use tracing::{debug, info};

/// Duty cycle used for backward motion and pivot turns.
pub const REVERSE_SPEED: f32 = 0.15;
pub const TURN_SPEED: f32 = 0.30;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriveCommand {
    Forward { speed: f32 },
    Backward,
    TurnLeft,
    TurnRight,
    Stop,
}

/// Per-wheel direction and duty cycle for the four-wheel differential drive
/// (front-left, front-right, rear-left, rear-right).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelOutputs {
    pub forward: [bool; 4],
    pub duty: [f32; 4],
}

impl DriveCommand {
    pub fn wheel_outputs(&self) -> WheelOutputs {
        const FWD: [bool; 4] = [true, false, true, false];
        match *self {
            DriveCommand::Forward { speed } => WheelOutputs {
                forward: FWD,
                duty: [speed; 4],
            },
            DriveCommand::Backward => WheelOutputs {
                forward: [false, true, false, true],
                duty: [REVERSE_SPEED; 4],
            },
            DriveCommand::TurnRight => WheelOutputs {
                forward: FWD,
                duty: [TURN_SPEED, 0.0, TURN_SPEED, 0.0],
            },
            DriveCommand::TurnLeft => WheelOutputs {
                forward: FWD,
                duty: [0.0, TURN_SPEED, 0.0, TURN_SPEED],
            },
            DriveCommand::Stop => WheelOutputs {
                forward: FWD,
                duty: [0.0; 4],
            },
        }
    }
}

/// Owned motor output. Implementations talk to the actual PWM hardware.
pub trait MotorDriver: Send {
    fn apply(&mut self, command: DriveCommand) -> Result<(), PeripheralError>;

    /// Zero all outputs.
    fn stop(&mut self) -> Result<(), PeripheralError> {
        self.apply(DriveCommand::Stop)
    }
}

/// Driver that only logs command changes, for runs without motor hardware.
#[derive(Debug, Default)]
pub struct LoggingMotor {
    last: Option<DriveCommand>,
}

impl LoggingMotor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<DriveCommand> {
        self.last
    }
}

impl MotorDriver for LoggingMotor {
    fn apply(&mut self, command: DriveCommand) -> Result<(), PeripheralError> {
        if self.last != Some(command) {
            let out = command.wheel_outputs();
            info!("🛞 Motor: {:?} (duty {:?})", command, out.duty);
        } else {
            debug!("Motor: {:?} (unchanged)", command);
        }
        self.last = Some(command);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turns_drive_one_side() {
        let right = DriveCommand::TurnRight.wheel_outputs();
        assert_eq!(right.duty, [0.3, 0.0, 0.3, 0.0]);
        let left = DriveCommand::TurnLeft.wheel_outputs();
        assert_eq!(left.duty, [0.0, 0.3, 0.0, 0.3]);
    }

    #[test]
    fn test_stop_zeroes_everything() {
        let out = DriveCommand::Stop.wheel_outputs();
        assert!(out.duty.iter().all(|&d| d == 0.0));
    }

    #[test]
    fn test_logging_motor_remembers_last() {
        let mut m = LoggingMotor::new();
        m.apply(DriveCommand::Forward { speed: 0.2 }).unwrap();
        m.stop().unwrap();
        assert_eq!(m.last(), Some(DriveCommand::Stop));
    }
}
