// src/peripherals/display.rs
//
// 4-line character panel showing the advisory:
//
//   ┌────────────────────┐
//   │22ga 2222           │  vehicle name
//   │IP: 192.168.0.12    │  address
//   │ETA: 03 min         │  or "ETA: -- min"
//   │Approaching         │  Approaching / Nearby / Idle
//   └────────────────────┘

use crate::error::PeripheralError;
use crate::types::DisplayConfig;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

pub const PANEL_LINES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayState {
    Approaching { eta_minutes: u64 },
    Nearby,
    Idle,
}

impl DisplayState {
    pub fn label(&self) -> &'static str {
        match self {
            DisplayState::Approaching { .. } => "Approaching",
            DisplayState::Nearby => "Nearby",
            DisplayState::Idle => "Idle",
        }
    }
}

/// Physical panel writer.
pub trait AdvisoryDisplay: Send {
    fn show(&mut self, lines: &[String; PANEL_LINES]) -> Result<(), PeripheralError>;
}

/// Panel stand-in that writes the rendered lines to the log.
#[derive(Debug, Default)]
pub struct ConsoleDisplay;

impl AdvisoryDisplay for ConsoleDisplay {
    fn show(&mut self, lines: &[String; PANEL_LINES]) -> Result<(), PeripheralError> {
        info!("📟 [{}] [{}] [{}] [{}]", lines[0], lines[1], lines[2], lines[3]);
        Ok(())
    }
}

fn fit(text: &str, width: usize) -> String {
    let mut s: String = text.chars().take(width).collect();
    let pad = width.saturating_sub(s.chars().count());
    s.extend(std::iter::repeat(' ').take(pad));
    s
}

pub fn render_lines(config: &DisplayConfig, state: DisplayState) -> [String; PANEL_LINES] {
    let eta = match state {
        DisplayState::Approaching { eta_minutes } => format!("ETA: {:02} min", eta_minutes),
        _ => "ETA: -- min".to_string(),
    };
    [
        fit(&config.vehicle_name, config.width),
        fit(&format!("IP: {}", config.vehicle_address), config.width),
        fit(&eta, config.width),
        fit(state.label(), config.width),
    ]
}

/// Single owner of the panel; every write goes through its lock.
#[derive(Clone)]
pub struct DisplayHandle {
    config: DisplayConfig,
    inner: Arc<Mutex<Box<dyn AdvisoryDisplay>>>,
    last: Arc<Mutex<Option<DisplayState>>>,
}

impl DisplayHandle {
    pub fn new(config: DisplayConfig, display: Box<dyn AdvisoryDisplay>) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(display)),
            last: Arc::new(Mutex::new(None)),
        }
    }

    pub fn update(&self, state: DisplayState) -> Result<(), PeripheralError> {
        let lines = render_lines(&self.config, state);
        let mut panel = self.inner.lock();
        panel.show(&lines)?;
        *self.last.lock() = Some(state);
        Ok(())
    }

    pub fn last_state(&self) -> Option<DisplayState> {
        *self.last.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Capture(Arc<Mutex<Vec<[String; PANEL_LINES]>>>);

    impl AdvisoryDisplay for Capture {
        fn show(&mut self, lines: &[String; PANEL_LINES]) -> Result<(), PeripheralError> {
            self.0.lock().push(lines.clone());
            Ok(())
        }
    }

    fn cfg() -> DisplayConfig {
        DisplayConfig {
            vehicle_name: "22ga 2222".to_string(),
            vehicle_address: "192.168.137.123".to_string(),
            width: 20,
        }
    }

    #[test]
    fn test_render_approaching() {
        let lines = render_lines(&cfg(), DisplayState::Approaching { eta_minutes: 3 });
        assert_eq!(lines[0], "22ga 2222           ");
        assert_eq!(lines[1], "IP: 192.168.137.123 ");
        assert_eq!(lines[2].trim_end(), "ETA: 03 min");
        assert_eq!(lines[3].trim_end(), "Approaching");
        assert!(lines.iter().all(|l| l.chars().count() == 20));
    }

    #[test]
    fn test_render_idle_truncates() {
        let mut c = cfg();
        c.vehicle_name = "a very long vehicle name indeed".to_string();
        let lines = render_lines(&c, DisplayState::Idle);
        assert_eq!(lines[0], "a very long vehicle ");
        assert_eq!(lines[2].trim_end(), "ETA: -- min");
        assert_eq!(lines[3].trim_end(), "Idle");
    }

    #[test]
    fn test_handle_serialises_writes() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handle = DisplayHandle::new(cfg(), Box::new(Capture(seen.clone())));
        let clone = handle.clone();
        handle.update(DisplayState::Nearby).unwrap();
        clone.update(DisplayState::Idle).unwrap();
        assert_eq!(seen.lock().len(), 2);
        assert_eq!(handle.last_state(), Some(DisplayState::Idle));
    }
}
