// src/main.rs

mod avoidance;
mod config;
mod coordination;
mod error;
mod geo;
mod lane_stabilizer;
mod metrics;
mod perception;
mod peripherals;
mod relative_position;
mod route;
mod telemetry;
mod types;

use anyhow::{Context, Result};
use coordination::{
    read_stdin, run_route, Coordinator, CoordinatorOutputs, Publisher, StdoutPublisher, VehicleStatus,
};
use metrics::RuntimeMetrics;
use peripherals::{
    Announcer, ConsoleDisplay, DisplayHandle, FrameSource, HttpSpeech, ImageSequenceSource, SilentSpeech, SpeechBackend,
};
use route::{RoutePolyline, RouteCursor};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use types::Config;

const DEFAULT_CONFIG: &str = "config.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("EMERGENCY_YIELD_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = Config::load(&config_path)?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("emergency_yield={}", config.logging.level)));
    // stdout carries egress envelopes
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("🚗 Emergency yield assistant starting");
    info!("✓ Configuration loaded from {}", config_path);
    info!(
        "Vehicle {} on lane {}/{}, evaluation every {:.1}s",
        config.vehicle.id, config.vehicle.initial_lane, config.vehicle.total_lanes, config.coordination.eval_interval_secs
    );

    let route = RoutePolyline::load(&config.vehicle.route_path)?;
    let cursor = RouteCursor::new(route);

    let running = Arc::new(AtomicBool::new(true));
    let metrics = RuntimeMetrics::new();
    let status = VehicleStatus::shared(&config);
    let publisher: Arc<dyn Publisher> = Arc::new(StdoutPublisher);
    let (tx, rx) = mpsc::channel(config.coordination.inbound_capacity);

    let speech: Arc<dyn SpeechBackend> = if config.speech.enabled {
        info!("🔊 Speech via {}", config.speech.endpoint);
        Arc::new(HttpSpeech::new(config.speech.clone()).context("Failed to build speech client")?)
    } else {
        info!("🔇 Speech disabled");
        Arc::new(SilentSpeech)
    };
    let outputs = CoordinatorOutputs {
        publisher: publisher.clone(),
        display: DisplayHandle::new(config.display.clone(), Box::new(ConsoleDisplay)),
        announcer: Announcer::new(speech, metrics.clone()),
    };

    let perception_thread = start_perception(&config, &status, &publisher, &tx, &metrics, &running)?;

    let reader = tokio::spawn(read_stdin(tx, config.topics.clone()));
    let route_task = tokio::spawn(run_route(cursor.clone(), publisher.clone(), config.clone(), running.clone()));
    let coordinator = Coordinator::new(config, cursor, status, outputs, metrics.clone(), running.clone());
    let mut coordination = tokio::spawn(coordinator.run(rx));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Signal handler failed: {}", e);
            }
            info!("🛑 Interrupt received, shutting down");
        }
        result = &mut coordination => {
            if let Err(e) = result {
                error!("Coordination task failed: {}", e);
            }
        }
    }

    running.store(false, Ordering::Release);
    reader.abort();
    route_task.abort();
    if !coordination.is_finished() {
        match tokio::time::timeout(Duration::from_secs(2), &mut coordination).await {
            Ok(Err(e)) => error!("Coordination task failed: {}", e),
            Err(_) => warn!("Coordination task did not stop in time"),
            Ok(Ok(())) => {}
        }
    }

    if let Some(handle) = perception_thread {
        let joined = tokio::task::spawn_blocking(move || handle.join()).await;
        if !matches!(joined, Ok(Ok(()))) {
            error!("Perception thread panicked");
        }
    }

    let summary = metrics.summary();
    info!("\n========================================");
    info!("📊 Run summary");
    info!("  Frames: {} ({:.1} fps)", summary.frames, summary.fps);
    info!("  Frames without lane: {}", summary.frames_without_lane);
    info!("  Lane confirmations: {}", summary.lane_confirmations);
    info!(
        "  Telemetry accepted/rejected: {}/{}",
        summary.telemetry_accepted, summary.telemetry_rejected
    );
    info!("  Evaluations: {}", summary.evaluations);
    info!(
        "  Announcements started/dropped: {}/{}",
        summary.announcements_started, summary.announcements_dropped
    );
    info!("  Peripheral failures: {}", summary.peripheral_failures);
    info!("========================================");

    Ok(())
}

/// Open the configured frame source and start the perception thread.
fn start_perception(
    config: &Config,
    status: &coordination::SharedStatus,
    publisher: &Arc<dyn Publisher>,
    tx: &mpsc::Sender<coordination::Inbound>,
    metrics: &RuntimeMetrics,
    running: &Arc<AtomicBool>,
) -> Result<Option<std::thread::JoinHandle<()>>> {
    if !config.perception.enabled {
        info!("Perception disabled, running coordination only");
        return Ok(None);
    }

    let source = open_frame_source(&config.perception)?;
    let perception = coordination::PerceptionLoop::new(
        config.clone(),
        source,
        Box::new(peripherals::LoggingMotor::new()),
        status.clone(),
        publisher.clone(),
        tx.clone(),
        metrics.clone(),
        running.clone(),
    );
    let handle = perception.spawn().context("Failed to spawn perception thread")?;
    Ok(Some(handle))
}

fn open_frame_source(config: &types::PerceptionConfig) -> Result<Box<dyn FrameSource>> {
    let source = config.camera_source.trim();
    if ImageSequenceSource::accepts(source) {
        return Ok(Box::new(ImageSequenceSource::open(config)?));
    }

    #[cfg(feature = "camera")]
    {
        Ok(Box::new(peripherals::frame_source::CameraSource::open(config)?))
    }

    #[cfg(not(feature = "camera"))]
    {
        anyhow::bail!(
            "frame source {} is not an image file or directory; camera capture needs the `camera` feature",
            source
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_image_directory_opens_without_camera() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(640, 360, Rgb([60, 60, 60]))
            .save(dir.path().join("000.png"))
            .unwrap();
        let config = types::PerceptionConfig {
            camera_source: dir.path().display().to_string(),
            ..types::PerceptionConfig::default()
        };
        let mut source = open_frame_source(&config).unwrap();
        let frame = source.capture().unwrap().unwrap();
        assert_eq!((frame.width, frame.height), (640, 360));
        assert!(source.capture().unwrap().is_none());
    }

    #[cfg(not(feature = "camera"))]
    #[test]
    fn test_device_source_needs_camera_feature() {
        let config = types::PerceptionConfig::default();
        let err = open_frame_source(&config).err().unwrap();
        assert!(err.to_string().contains("camera"));
    }
}
