// src/lane_stabilizer.rs

use tracing::info;

/// Debounces per-frame lane indices into a confirmed lane.
///
/// A candidate is confirmed after `required` consecutive equal observations;
/// a different lane restarts the run at 1 and frames without a lane are
/// ignored entirely.
#[derive(Debug, Clone)]
pub struct LaneStabilizer {
    required: u32,
    candidate: Option<u8>,
    run_length: u32,
    confirmed: Option<u8>,
}

impl LaneStabilizer {
    pub fn new(required: u32) -> Self {
        Self {
            required: required.max(1),
            candidate: None,
            run_length: 0,
            confirmed: None,
        }
    }

    /// Returns the lane only on the observation that changes the confirmed lane.
    pub fn observe(&mut self, lane: Option<u8>) -> Option<u8> {
        let lane = lane?;
        if self.candidate == Some(lane) {
            self.run_length += 1;
        } else {
            self.candidate = Some(lane);
            self.run_length = 1;
        }

        if self.run_length >= self.required && self.confirmed != Some(lane) {
            info!("✅ Lane change confirmed: {:?} → {}", self.confirmed, lane);
            self.confirmed = Some(lane);
            return Some(lane);
        }
        None
    }

    pub fn confirmed(&self) -> Option<u8> {
        self.confirmed
    }
}
