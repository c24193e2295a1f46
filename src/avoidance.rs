// src/avoidance.rs
//
// Avoidance lookup: where should the ego vehicle go, and which lane will the
// higher-priority vehicle most likely use.
//
//   lanes │ lane → direction              │ other vehicle
//   ──────┼───────────────────────────────┼──────────────
//     3   │ 1 straight, 2 right, 3 left   │ 2
//     2   │ 1 right, 2 straight           │ 1
//     1   │ 1 straight                    │ 1
//   other │ undetermined                  │ undetermined

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AvoidDirection {
    Straight,
    Right,
    Left,
    Undetermined,
}

impl AvoidDirection {
    /// Wire code used in the status message.
    pub fn code(&self) -> i8 {
        match self {
            AvoidDirection::Straight => 0,
            AvoidDirection::Right => 1,
            AvoidDirection::Left => 2,
            AvoidDirection::Undetermined => -1,
        }
    }

    /// Spoken form, used in announcements.
    pub fn spoken(&self) -> &'static str {
        match self {
            AvoidDirection::Straight => "straight ahead",
            AvoidDirection::Right => "to the right",
            AvoidDirection::Left => "to the left",
            // announcements default to keeping course
            AvoidDirection::Undetermined => "straight ahead",
        }
    }
}

impl Serialize for AvoidDirection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i8(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvoidanceDecision {
    pub direction: AvoidDirection,
    /// `None` when undetermined
    pub other_vehicle_lane: Option<u8>,
}

impl AvoidanceDecision {
    fn undetermined() -> Self {
        Self {
            direction: AvoidDirection::Undetermined,
            other_vehicle_lane: None,
        }
    }
}

pub fn decide(lane: u8, total_lanes: u8) -> AvoidanceDecision {
    use AvoidDirection::*;
    let (direction, other) = match (total_lanes, lane) {
        (3, 1) => (Straight, 2),
        (3, 2) => (Right, 2),
        (3, 3) => (Left, 2),
        (2, 1) => (Right, 1),
        (2, 2) => (Straight, 1),
        (1, 1) => (Straight, 1),
        _ => return AvoidanceDecision::undetermined(),
    };
    AvoidanceDecision {
        direction,
        other_vehicle_lane: Some(other),
    }
}
