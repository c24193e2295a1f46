// src/peripherals/announcer.rs
//
// Single-flight evasion announcements. While one announcement is being
// synthesised or played, new requests are dropped, never queued.

use super::speech::SpeechBackend;
use crate::avoidance::AvoidDirection;
use crate::metrics::RuntimeMetrics;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub fn evasion_text(direction: AvoidDirection, minutes: u64) -> String {
    format!(
        "Emergency vehicle arrives in {} minutes. Please move {}.",
        minutes,
        direction.spoken()
    )
}

#[derive(Clone)]
pub struct Announcer {
    backend: Arc<dyn SpeechBackend>,
    in_flight: Arc<Mutex<()>>,
    metrics: RuntimeMetrics,
}

impl Announcer {
    pub fn new(backend: Arc<dyn SpeechBackend>, metrics: RuntimeMetrics) -> Self {
        Self {
            backend,
            in_flight: Arc::new(Mutex::new(())),
            metrics,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    /// Fire-and-forget. Returns the spawned task, or `None` if the request
    /// was dropped because another announcement is still running.
    /// Must be called from within a tokio runtime.
    pub fn announce(&self, direction: AvoidDirection, minutes: u64) -> Option<JoinHandle<()>> {
        let guard = match self.in_flight.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                self.metrics.inc(&self.metrics.announcements_dropped);
                info!("🔇 Announcement still in progress, dropping request");
                return None;
            }
        };

        let text = evasion_text(direction, minutes);
        info!("📢 Announcing: {}", text);
        self.metrics.inc(&self.metrics.announcements_started);

        let backend = self.backend.clone();
        let metrics = self.metrics.clone();
        Some(tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = backend.speak(text).await {
                metrics.inc(&metrics.peripheral_failures);
                warn!("Announcement failed: {}", e);
            }
        }))
    }
}
