// src/coordination/drive_loop.rs
//
// Perception/actuation context. Runs on its own OS thread:
//
//   capture ─► LanePerceptionPipeline ─► decide_drive ─► motor
//                      │
//                      └─► LaneStabilizer ─► lane egress + coordination channel

use super::messages::{Inbound, Publisher};
use super::status::{ManualTurn, SharedStatus, VehicleStatus};
use crate::lane_stabilizer::LaneStabilizer;
use crate::metrics::RuntimeMetrics;
use crate::perception::{FrameOutcome, LanePerceptionPipeline};
use crate::peripherals::{DriveCommand, FrameSource, MotorDriver};
use crate::types::{Config, DriveConfig, Frame};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const CAPTURE_RETRY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq)]
pub struct DriveDecision {
    pub command: DriveCommand,
    /// Degrees, positive to the right
    pub steering_angle: f32,
    pub state_text: &'static str,
}

/// Pick the motor command for one frame.
///
/// Priority: manual stop, manual turn, backward, then lane keeping on the
/// smoothed offset. Offsets past `offset_lock_px` are treated as a lost
/// track and driven straight.
pub fn decide_drive(
    status: &VehicleStatus,
    smoothed_offset: Option<f32>,
    frame_width: usize,
    cfg: &DriveConfig,
) -> DriveDecision {
    let forward = DriveCommand::Forward { speed: status.speed };

    if status.manual_stop {
        return DriveDecision {
            command: DriveCommand::Stop,
            steering_angle: 0.0,
            state_text: "MANUAL STOP",
        };
    }
    if let Some(turn) = status.manual_turn {
        let (command, angle) = match turn {
            ManualTurn::Left => (DriveCommand::TurnLeft, -cfg.manual_turn_angle_deg),
            ManualTurn::Right => (DriveCommand::TurnRight, cfg.manual_turn_angle_deg),
        };
        return DriveDecision {
            command,
            steering_angle: angle,
            state_text: "MANUAL TURN",
        };
    }
    if status.moving_backward {
        return DriveDecision {
            command: DriveCommand::Backward,
            steering_angle: 0.0,
            state_text: "BACKWARD",
        };
    }

    let Some(offset) = smoothed_offset else {
        return DriveDecision {
            command: forward,
            steering_angle: 0.0,
            state_text: "RUNNING (FWD)",
        };
    };
    let steering_angle = if frame_width > 0 {
        offset * cfg.camera_fov_deg / frame_width as f32
    } else {
        0.0
    };

    let (command, state_text) = if offset.abs() > cfg.offset_lock_px {
        (forward, "RUNNING (OFFSET LOCK)")
    } else if offset > cfg.deadband_px {
        (DriveCommand::TurnRight, "RUNNING (RIGHT)")
    } else if offset < -cfg.deadband_px {
        (DriveCommand::TurnLeft, "RUNNING (LEFT)")
    } else {
        (forward, "RUNNING (LANE)")
    };

    DriveDecision {
        command,
        steering_angle,
        state_text,
    }
}

pub struct PerceptionLoop {
    config: Config,
    pipeline: LanePerceptionPipeline,
    stabilizer: LaneStabilizer,
    source: Box<dyn FrameSource>,
    motor: Box<dyn MotorDriver>,
    status: SharedStatus,
    publisher: Arc<dyn Publisher>,
    lane_tx: mpsc::Sender<Inbound>,
    metrics: RuntimeMetrics,
    running: Arc<AtomicBool>,
}

impl PerceptionLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        source: Box<dyn FrameSource>,
        motor: Box<dyn MotorDriver>,
        status: SharedStatus,
        publisher: Arc<dyn Publisher>,
        lane_tx: mpsc::Sender<Inbound>,
        metrics: RuntimeMetrics,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            pipeline: LanePerceptionPipeline::new(config.perception.clone()),
            stabilizer: LaneStabilizer::new(config.stabilizer.confirm_frames),
            config,
            source,
            motor,
            status,
            publisher,
            lane_tx,
            metrics,
            running,
        }
    }

    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("perception".to_string())
            .spawn(move || self.run())
    }

    /// Blocks until the running flag drops or the source is exhausted.
    /// Motor and camera are released on every exit path.
    pub fn run(mut self) {
        info!("📷 Perception loop started");
        if let Err(e) = self.source.start() {
            error!("❌ Frame source failed to start: {}", e);
            self.metrics.inc(&self.metrics.peripheral_failures);
            self.shutdown();
            return;
        }

        while self.running.load(Ordering::Acquire) {
            match self.source.capture() {
                Ok(Some(frame)) => self.step(&frame),
                Ok(None) => {
                    info!("Frame source exhausted");
                    break;
                }
                Err(e) => {
                    self.metrics.inc(&self.metrics.peripheral_failures);
                    warn!("Capture failed: {}", e);
                    thread::sleep(CAPTURE_RETRY);
                }
            }

            let frames = self.metrics.get(&self.metrics.frames);
            if frames > 0 && frames % 300 == 0 {
                info!("📊 {} frames, {:.1} fps", frames, self.metrics.fps());
            }
        }

        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Err(e) = self.motor.stop() {
            warn!("Motor stop failed: {}", e);
        }
        self.source.stop();
        info!("📷 Perception loop stopped");
    }

    fn step(&mut self, frame: &Frame) {
        self.metrics.inc(&self.metrics.frames);

        let outcome = self.pipeline.process_frame(frame);
        match &outcome {
            FrameOutcome::Failed { cause, .. } => {
                self.metrics.inc(&self.metrics.perception_failures);
                debug!("Frame {} failed: {}", self.pipeline.frame_count(), cause);
            }
            FrameOutcome::Partial { cause, .. } => {
                debug!("Frame {} partial: {:?}", self.pipeline.frame_count(), cause);
            }
            FrameOutcome::Detected(_) => {}
        }
        let raw_lane = outcome.current_lane();
        if raw_lane.is_none() {
            self.metrics.inc(&self.metrics.frames_without_lane);
        }

        let smoothed_offset = outcome.smoothed_center_x().map(|x| x - frame.center_x());
        let has_lane = outcome
            .reading()
            .map(|r| r.left_control.is_some() || r.right_control.is_some())
            .unwrap_or(false);

        let decision = {
            let mut status = self.status.lock();
            let decision = decide_drive(&status, smoothed_offset, frame.width, &self.config.drive);
            let evasion = status.evasion_mode;
            let total = status.total_lanes;
            let ui = &mut status.ui;
            ui.has_lane = has_lane;
            ui.lane_text = raw_lane.map(|l| l.to_string()).unwrap_or_else(|| "?".to_string());
            ui.lane_total = total;
            ui.offset_norm = match smoothed_offset {
                Some(offset) if frame.width > 0 => offset / (frame.width as f32 / 2.0),
                _ => 0.0,
            };
            ui.state_text = if evasion {
                format!("EVASION: {}", decision.state_text)
            } else {
                decision.state_text.to_string()
            };
            ui.steering_angle = (decision.steering_angle * 100.0).round() / 100.0;
            decision
        };

        if let Err(e) = self.motor.apply(decision.command) {
            self.metrics.inc(&self.metrics.peripheral_failures);
            warn!("Motor command {:?} failed: {}", decision.command, e);
        }

        if let Some(lane) = self.stabilizer.observe(raw_lane) {
            self.metrics.inc(&self.metrics.lane_confirmations);
            if let Err(e) = self.publisher.publish(&self.config.topics.lane, json!(lane)) {
                self.metrics.inc(&self.metrics.peripheral_failures);
                warn!("Lane publish failed: {}", e);
            }
            if self.lane_tx.try_send(Inbound::LaneConfirmation(lane)).is_err() {
                warn!("Coordination channel full, lane {} not forwarded", lane);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::messages::MemoryPublisher;
    use crate::error::PeripheralError;
    use crate::perception::pipeline::synthetic::road_frame;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    fn status() -> VehicleStatus {
        VehicleStatus::new(&Config::default())
    }

    #[test]
    fn test_manual_controls_take_priority() {
        let cfg = DriveConfig::default();
        let mut s = status();
        s.manual_stop = true;
        s.manual_turn = Some(ManualTurn::Left);
        let d = decide_drive(&s, Some(50.0), 640, &cfg);
        assert_eq!(d.command, DriveCommand::Stop);
        assert_eq!(d.state_text, "MANUAL STOP");

        s.manual_stop = false;
        let d = decide_drive(&s, Some(50.0), 640, &cfg);
        assert_eq!(d.command, DriveCommand::TurnLeft);
        assert_eq!(d.steering_angle, -30.0);

        s.manual_turn = None;
        s.moving_backward = true;
        let d = decide_drive(&s, Some(50.0), 640, &cfg);
        assert_eq!(d.command, DriveCommand::Backward);
    }

    #[test]
    fn test_lane_keeping_bands() {
        let cfg = DriveConfig::default();
        let s = status();
        let forward = DriveCommand::Forward { speed: s.speed };

        let d = decide_drive(&s, None, 640, &cfg);
        assert_eq!((d.command, d.state_text), (forward, "RUNNING (FWD)"));

        let d = decide_drive(&s, Some(10.0), 640, &cfg);
        assert_eq!((d.command, d.state_text), (forward, "RUNNING (LANE)"));

        let d = decide_drive(&s, Some(40.0), 640, &cfg);
        assert_eq!(d.command, DriveCommand::TurnRight);
        assert!((d.steering_angle - 40.0 * 62.0 / 640.0).abs() < 1e-4);

        let d = decide_drive(&s, Some(-40.0), 640, &cfg);
        assert_eq!(d.command, DriveCommand::TurnLeft);

        let d = decide_drive(&s, Some(120.0), 640, &cfg);
        assert_eq!((d.command, d.state_text), (forward, "RUNNING (OFFSET LOCK)"));
    }

    /// `None` entries make `capture` fail once.
    struct ScriptedSource {
        frames: VecDeque<Option<Frame>>,
        stopped: Arc<AtomicBool>,
    }

    impl FrameSource for ScriptedSource {
        fn capture(&mut self) -> Result<Option<Frame>, PeripheralError> {
            match self.frames.pop_front() {
                Some(Some(frame)) => Ok(Some(frame)),
                Some(None) => Err(PeripheralError::Timeout("camera read")),
                None => Ok(None),
            }
        }

        fn stop(&mut self) {
            self.stopped.store(true, Ordering::Release);
        }
    }

    struct RecordingMotor {
        commands: Arc<Mutex<Vec<DriveCommand>>>,
        broken: bool,
    }

    impl MotorDriver for RecordingMotor {
        fn apply(&mut self, command: DriveCommand) -> Result<(), PeripheralError> {
            self.commands.lock().push(command);
            if self.broken {
                return Err(std::io::Error::other("i2c write failed").into());
            }
            Ok(())
        }
    }

    struct Harness {
        lane_rx: mpsc::Receiver<Inbound>,
        publisher: Arc<MemoryPublisher>,
        commands: Arc<Mutex<Vec<DriveCommand>>>,
        stopped: Arc<AtomicBool>,
        status: SharedStatus,
        metrics: RuntimeMetrics,
    }

    fn run_with(frames: Vec<Frame>, running: bool, evasion: bool) -> Harness {
        run_script(frames.into_iter().map(Some).collect(), running, evasion, false)
    }

    fn run_script(script: Vec<Option<Frame>>, running: bool, evasion: bool, broken_motor: bool) -> Harness {
        let config = Config::default();
        let (lane_tx, lane_rx) = mpsc::channel(4);
        let publisher = Arc::new(MemoryPublisher::new());
        let commands = Arc::new(Mutex::new(Vec::new()));
        let stopped = Arc::new(AtomicBool::new(false));
        let status = VehicleStatus::shared(&config);
        status.lock().evasion_mode = evasion;
        let metrics = RuntimeMetrics::new();

        let source = ScriptedSource {
            frames: script.into(),
            stopped: stopped.clone(),
        };
        let motor = RecordingMotor {
            commands: commands.clone(),
            broken: broken_motor,
        };
        PerceptionLoop::new(
            config,
            Box::new(source),
            Box::new(motor),
            status.clone(),
            publisher.clone(),
            lane_tx,
            metrics.clone(),
            Arc::new(AtomicBool::new(running)),
        )
        .run();

        Harness {
            lane_rx,
            publisher,
            commands,
            stopped,
            status,
            metrics,
        }
    }

    #[test]
    fn test_confirmed_lane_is_published_once() {
        let frames = (0..4).map(|_| road_frame(false, true, 0.0)).collect();
        let mut h = run_with(frames, true, false);

        assert_eq!(h.publisher.on_topic("car/current_lane"), vec![json!(1)]);
        assert_eq!(h.lane_rx.try_recv().unwrap(), Inbound::LaneConfirmation(1));
        assert!(h.lane_rx.try_recv().is_err());

        let summary = h.metrics.summary();
        assert_eq!(summary.frames, 4);
        assert_eq!(summary.lane_confirmations, 1);

        let ui = h.status.lock().ui.clone();
        assert!(ui.has_lane);
        assert_eq!(ui.lane_text, "1");
        assert_eq!(ui.state_text, "RUNNING (LANE)");

        let commands = h.commands.lock();
        assert_eq!(commands.len(), 5);
        assert_eq!(commands.last(), Some(&DriveCommand::Stop));
        assert!(h.stopped.load(Ordering::Acquire));
    }

    #[test]
    fn test_capture_and_motor_failures_do_not_stop_the_loop() {
        let frame = || Some(road_frame(false, true, 0.0));
        let script = vec![frame(), None, frame(), frame(), frame()];
        let mut h = run_script(script, true, false, true);

        let summary = h.metrics.summary();
        assert_eq!(summary.frames, 4);
        // one capture error plus every rejected motor command
        assert_eq!(summary.peripheral_failures, 5);
        assert_eq!(summary.lane_confirmations, 1);
        assert_eq!(h.lane_rx.try_recv().unwrap(), Inbound::LaneConfirmation(1));
        assert_eq!(h.publisher.on_topic("car/current_lane"), vec![json!(1)]);

        let ui = h.status.lock().ui.clone();
        assert_eq!(ui.lane_text, "1");
        assert_eq!(ui.state_text, "RUNNING (LANE)");
        // shutdown still tries to stop the motor and release the source
        assert_eq!(h.commands.lock().last(), Some(&DriveCommand::Stop));
        assert!(h.stopped.load(Ordering::Acquire));
    }

    #[test]
    fn test_evasion_prefix_and_lost_lane() {
        let frames = vec![Frame::new(vec![50; 640 * 360 * 3], 640, 360, 0.0)];
        let h = run_with(frames, true, true);

        let ui = h.status.lock().ui.clone();
        assert!(!ui.has_lane);
        assert_eq!(ui.lane_text, "?");
        assert_eq!(ui.state_text, "EVASION: RUNNING (FWD)");
        assert_eq!(h.metrics.summary().frames_without_lane, 1);
        assert!(h.publisher.sent().is_empty());
    }

    #[test]
    fn test_cleared_flag_still_releases_hardware() {
        let frames = vec![road_frame(false, true, 0.0)];
        let h = run_with(frames, false, false);
        assert_eq!(h.metrics.summary().frames, 0);
        assert_eq!(*h.commands.lock(), vec![DriveCommand::Stop]);
        assert!(h.stopped.load(Ordering::Acquire));
    }
}
