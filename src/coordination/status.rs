// src/coordination/status.rs
//
// The one mutable record shared by the perception/actuation thread and the
// coordination task. Guarded by a single lock; critical sections only copy
// or assign fields.

use crate::error::MessageError;
use crate::types::{Config, DriveConfig};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;

pub type SharedStatus = Arc<Mutex<VehicleStatus>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualTurn {
    Left,
    Right,
}

/// Dashboard-facing view, refreshed every frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiStatus {
    pub has_lane: bool,
    pub lane_text: String,
    pub lane_total: u8,
    pub offset_norm: f32,
    pub speed_text: String,
    pub state_text: String,
    pub steering_angle: f32,
}

#[derive(Debug, Clone)]
pub struct VehicleStatus {
    pub manual_stop: bool,
    pub manual_turn: Option<ManualTurn>,
    pub moving_backward: bool,
    pub speed: f32,
    /// Set while an approach advisory is active
    pub evasion_mode: bool,
    /// Confirmed ego lane as seen by coordination
    pub current_lane: u8,
    pub total_lanes: u8,
    pub ui: UiStatus,
}

impl VehicleStatus {
    pub fn new(config: &Config) -> Self {
        Self {
            manual_stop: config.drive.start_stopped,
            manual_turn: None,
            moving_backward: false,
            speed: config.drive.initial_speed,
            evasion_mode: false,
            current_lane: config.vehicle.initial_lane,
            total_lanes: config.vehicle.total_lanes,
            ui: UiStatus {
                has_lane: false,
                lane_text: "?".to_string(),
                lane_total: config.vehicle.total_lanes,
                offset_norm: 0.0,
                speed_text: format!("{:.2}", config.drive.initial_speed),
                state_text: if config.drive.start_stopped { "STOPPED" } else { "READY" }.to_string(),
                steering_angle: 0.0,
            },
        }
    }

    pub fn shared(config: &Config) -> SharedStatus {
        Arc::new(Mutex::new(Self::new(config)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    TurnLeft,
    TurnRight,
    TurnStop,
    SpeedUp,
    SpeedDown,
    ToggleStop,
    ToggleBackward,
    Quit,
}

impl FromStr for ControlAction {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "turn_left" => ControlAction::TurnLeft,
            "turn_right" => ControlAction::TurnRight,
            "turn_stop" => ControlAction::TurnStop,
            "speed_up" => ControlAction::SpeedUp,
            "speed_down" => ControlAction::SpeedDown,
            "toggle_stop" => ControlAction::ToggleStop,
            "toggle_backward" => ControlAction::ToggleBackward,
            "quit" => ControlAction::Quit,
            other => return Err(MessageError::UnknownAction(other.to_string())),
        })
    }
}

impl ControlAction {
    /// Apply to the record and build the reply. `Quit` only acknowledges;
    /// the caller owns the running flag.
    pub fn apply(self, status: &mut VehicleStatus, drive: &DriveConfig) -> Value {
        let mut reply = json!({ "ok": true });
        match self {
            ControlAction::TurnLeft => status.manual_turn = Some(ManualTurn::Left),
            ControlAction::TurnRight => status.manual_turn = Some(ManualTurn::Right),
            ControlAction::TurnStop => status.manual_turn = None,
            ControlAction::SpeedUp | ControlAction::SpeedDown => {
                let step = if self == ControlAction::SpeedUp {
                    drive.speed_step
                } else {
                    -drive.speed_step
                };
                status.speed = (status.speed + step).clamp(drive.min_speed, drive.max_speed);
                status.ui.speed_text = format!("{:.2}", status.speed);
                reply["speed"] = json!(status.speed);
            }
            ControlAction::ToggleStop => {
                status.manual_stop = !status.manual_stop;
                reply["stopped"] = json!(status.manual_stop);
            }
            ControlAction::ToggleBackward => {
                status.moving_backward = !status.moving_backward;
                reply["backward"] = json!(status.moving_backward);
            }
            ControlAction::Quit => {}
        }
        reply
    }
}
