// src/coordination/coordinator.rs
//
// Message-driven context.
//
// Telemetry updates the cached snapshot immediately; recomputation is
// throttled to one evaluation per interval. Each evaluation:
//   1. Ego position/successor from the route cursor (skipped once finished)
//   2. RelativePositionEngine::evaluate
//   3. Feedback egress
//   4. Advisory:   same road + ETA → Approaching
//                  within nearby radius → Nearby
//                  otherwise → Idle
//   5. Status egress, panel update, announcement (Approaching only)

use super::messages::{
    format_eta, local_timestamp, publish_json, AdvisoryState, FeedbackMessage, Inbound, PositionMessage,
    Publisher, StatusMessage,
};
use super::status::{ControlAction, SharedStatus};
use crate::avoidance::{decide, AvoidanceDecision};
use crate::error::PeripheralError;
use crate::metrics::RuntimeMetrics;
use crate::peripherals::{Announcer, DisplayHandle, DisplayState};
use crate::relative_position::RelativePositionEngine;
use crate::route::RouteCursor;
use crate::types::Config;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Advisory {
    Approaching { eta_s: f64, decision: AvoidanceDecision },
    Nearby,
    Idle,
}

impl Advisory {
    pub fn state(&self) -> AdvisoryState {
        match self {
            Advisory::Approaching { .. } => AdvisoryState::SamePath,
            Advisory::Nearby => AdvisoryState::Nearby,
            Advisory::Idle => AdvisoryState::Idle,
        }
    }
}

/// Everything the coordinator writes to.
#[derive(Clone)]
pub struct CoordinatorOutputs {
    pub publisher: Arc<dyn Publisher>,
    pub display: DisplayHandle,
    pub announcer: Announcer,
}

pub struct Coordinator {
    config: Config,
    engine: RelativePositionEngine,
    cursor: RouteCursor,
    status: SharedStatus,
    outputs: CoordinatorOutputs,
    metrics: RuntimeMetrics,
    running: Arc<AtomicBool>,
    eval_interval: Duration,
    last_eval: Option<Instant>,
    last_state: Option<AdvisoryState>,
}

impl Coordinator {
    pub fn new(
        config: Config,
        cursor: RouteCursor,
        status: SharedStatus,
        outputs: CoordinatorOutputs,
        metrics: RuntimeMetrics,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            engine: RelativePositionEngine::new(config.relative.clone()),
            eval_interval: Duration::from_secs_f64(config.coordination.eval_interval_secs),
            config,
            cursor,
            status,
            outputs,
            metrics,
            running,
            last_eval: None,
            last_state: None,
        }
    }

    #[cfg(test)]
    pub fn engine(&self) -> &RelativePositionEngine {
        &self.engine
    }

    /// Dispatch one inbound message. Returns the advisory when an evaluation ran.
    pub fn handle(&mut self, msg: Inbound, now: Instant) -> Option<Advisory> {
        match msg {
            Inbound::Telemetry(payload) => {
                match self.engine.update(payload) {
                    Ok(()) => self.metrics.inc(&self.metrics.telemetry_accepted),
                    Err(_) => self.metrics.inc(&self.metrics.telemetry_rejected),
                }
                if let Some(last) = self.last_eval {
                    if now.saturating_duration_since(last) < self.eval_interval {
                        debug!("Evaluation throttled");
                        return None;
                    }
                }
                self.last_eval = Some(now);
                self.evaluate()
            }
            Inbound::LaneConfirmation(lane) => {
                let mut status = self.status.lock();
                if status.current_lane != lane {
                    info!("🚗 Ego lane updated: {} → {}", status.current_lane, lane);
                }
                status.current_lane = lane;
                None
            }
            Inbound::Control(action) => {
                let reply = {
                    let mut status = self.status.lock();
                    action.apply(&mut status, &self.config.drive)
                };
                info!("🎮 Control {:?} → {}", action, reply);
                if action == ControlAction::Quit {
                    info!("Quit requested");
                    self.running.store(false, Ordering::Release);
                }
                None
            }
        }
    }

    fn evaluate(&mut self) -> Option<Advisory> {
        let Some((me, next)) = self.cursor.current() else {
            debug!("Ego route finished, skipping evaluation");
            return None;
        };
        self.metrics.inc(&self.metrics.evaluations);

        let relative = self.engine.evaluate(me, next);
        let (lane, total) = {
            let status = self.status.lock();
            (status.current_lane, status.total_lanes)
        };

        let feedback = FeedbackMessage {
            vehicle_id: self.config.vehicle.id.clone(),
            current: me,
            total_lanes: total,
            current_lane: lane,
            same_road_and_direction: relative.map(|r| r.same_road_and_direction),
            timestamp: local_timestamp(),
        };
        let result = publish_json(self.outputs.publisher.as_ref(), &self.config.topics.feedback, &feedback);
        self.record(result, "feedback");

        let advisory = match relative {
            Some(r) if r.same_road_and_direction => match r.eta_s {
                Some(eta_s) => Advisory::Approaching {
                    eta_s,
                    decision: decide(lane, total),
                },
                None => Advisory::Idle,
            },
            Some(r) if r.is_nearby => Advisory::Nearby,
            _ => Advisory::Idle,
        };

        self.publish_advisory(&advisory, lane, total);
        Some(advisory)
    }

    fn publish_advisory(&mut self, advisory: &Advisory, lane: u8, total: u8) {
        let state = advisory.state();
        if self.last_state != Some(state) {
            info!("🚑 Advisory: {:?} → {:?}", self.last_state, state);
            self.last_state = Some(state);
        }

        let message = match advisory {
            Advisory::Approaching { eta_s, decision } => StatusMessage {
                lanes: total,
                current_lane: lane,
                avoid_dir: Some(decision.direction),
                other_vehicle_lane: decision.other_vehicle_lane,
                state,
                eta: Some(format_eta(*eta_s)),
            },
            _ => StatusMessage {
                lanes: total,
                current_lane: lane,
                avoid_dir: None,
                other_vehicle_lane: None,
                state,
                eta: None,
            },
        };
        let result = publish_json(self.outputs.publisher.as_ref(), &self.config.topics.status, &message);
        self.record(result, "status");

        let panel = match advisory {
            Advisory::Approaching { eta_s, .. } => DisplayState::Approaching {
                eta_minutes: (*eta_s / 60.0) as u64,
            },
            Advisory::Nearby => DisplayState::Nearby,
            Advisory::Idle => DisplayState::Idle,
        };
        let result = self.outputs.display.update(panel);
        self.record(result, "display");

        let approaching = matches!(advisory, Advisory::Approaching { .. });
        self.status.lock().evasion_mode = approaching;

        if let Advisory::Approaching { eta_s, decision } = advisory {
            self.outputs.announcer.announce(decision.direction, (*eta_s / 60.0) as u64);
        }
    }

    fn record(&self, result: Result<(), PeripheralError>, what: &str) {
        if let Err(e) = result {
            self.metrics.inc(&self.metrics.peripheral_failures);
            warn!("{} output failed: {}", what, e);
        }
    }

    /// Reset every advisory output to idle.
    pub fn clear_advisories(&mut self) {
        let (lane, total) = {
            let status = self.status.lock();
            (status.current_lane, status.total_lanes)
        };
        self.publish_advisory(&Advisory::Idle, lane, total);
    }

    /// Consume inbound messages until the running flag drops.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Inbound>) {
        info!("🛰️ Coordination loop started");
        let mut tick = tokio::time::interval(Duration::from_millis(200));
        let mut open = true;
        while self.running.load(Ordering::Acquire) {
            tokio::select! {
                msg = rx.recv(), if open => match msg {
                    Some(msg) => {
                        self.handle(msg, Instant::now());
                    }
                    None => {
                        debug!("Inbound channel closed");
                        open = false;
                    }
                },
                _ = tick.tick() => {}
            }
        }
        self.clear_advisories();
        info!("🛰️ Coordination loop stopped");
    }
}

/// Walks the ego route one waypoint per step, publishing each position.
pub async fn run_route(
    cursor: RouteCursor,
    publisher: Arc<dyn Publisher>,
    config: Config,
    running: Arc<AtomicBool>,
) {
    let step = Duration::from_secs_f64(config.coordination.route_step_secs);
    let mut tick = tokio::time::interval(step);
    while running.load(Ordering::Acquire) {
        tick.tick().await;
        let Some(point) = cursor.advance() else {
            info!("🏁 Ego route finished");
            break;
        };
        debug!("Ego position {} (waypoint {})", point, cursor.index());
        let message = PositionMessage {
            vehicle_id: config.vehicle.id.clone(),
            current: point,
        };
        if let Err(e) = publish_json(publisher.as_ref(), &config.topics.position, &message) {
            warn!("Position publish failed: {}", e);
        }
    }
}
