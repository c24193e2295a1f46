// src/metrics.rs
//
// Runtime counters shared by both execution contexts. Cheap to clone; every
// clone points at the same atomics. Summary is logged at shutdown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct RuntimeMetrics {
    pub frames: Arc<AtomicU64>,
    pub frames_without_lane: Arc<AtomicU64>,
    pub perception_failures: Arc<AtomicU64>,
    pub lane_confirmations: Arc<AtomicU64>,
    pub telemetry_accepted: Arc<AtomicU64>,
    pub telemetry_rejected: Arc<AtomicU64>,
    pub evaluations: Arc<AtomicU64>,
    pub announcements_started: Arc<AtomicU64>,
    pub announcements_dropped: Arc<AtomicU64>,
    pub peripheral_failures: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for RuntimeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeMetrics {
    pub fn new() -> Self {
        Self {
            frames: Arc::new(AtomicU64::new(0)),
            frames_without_lane: Arc::new(AtomicU64::new(0)),
            perception_failures: Arc::new(AtomicU64::new(0)),
            lane_confirmations: Arc::new(AtomicU64::new(0)),
            telemetry_accepted: Arc::new(AtomicU64::new(0)),
            telemetry_rejected: Arc::new(AtomicU64::new(0)),
            evaluations: Arc::new(AtomicU64::new(0)),
            announcements_started: Arc::new(AtomicU64::new(0)),
            announcements_dropped: Arc::new(AtomicU64::new(0)),
            peripheral_failures: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    pub fn fps(&self) -> f64 {
        let frames = self.frames.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            frames: self.get(&self.frames),
            fps: self.fps(),
            frames_without_lane: self.get(&self.frames_without_lane),
            perception_failures: self.get(&self.perception_failures),
            lane_confirmations: self.get(&self.lane_confirmations),
            telemetry_accepted: self.get(&self.telemetry_accepted),
            telemetry_rejected: self.get(&self.telemetry_rejected),
            evaluations: self.get(&self.evaluations),
            announcements_started: self.get(&self.announcements_started),
            announcements_dropped: self.get(&self.announcements_dropped),
            peripheral_failures: self.get(&self.peripheral_failures),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub frames: u64,
    pub fps: f64,
    pub frames_without_lane: u64,
    pub perception_failures: u64,
    pub lane_confirmations: u64,
    pub telemetry_accepted: u64,
    pub telemetry_rejected: u64,
    pub evaluations: u64,
    pub announcements_started: u64,
    pub announcements_dropped: u64,
    pub peripheral_failures: u64,
    pub elapsed_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_counters() {
        let m = RuntimeMetrics::new();
        let c = m.clone();
        c.inc(&c.evaluations);
        m.inc(&m.evaluations);
        assert_eq!(m.summary().evaluations, 2);
        assert_eq!(m.summary().frames, 0);
    }
}
