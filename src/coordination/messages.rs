// src/coordination/messages.rs
//
// Wire side of the coordination context.
//
// Transport is a newline-delimited JSON envelope stream, one message per
// line: {"topic": "...", "payload": ...}. Ingress is read from stdin and
// egress written to stdout, so any broker client can be piped through.

use super::status::ControlAction;
use crate::avoidance::AvoidDirection;
use crate::error::{MessageError, PeripheralError};
use crate::geo::GeoPoint;
use crate::types::TopicConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

// ============================================================================
// ENVELOPE / INGRESS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: String,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Telemetry(Value),
    LaneConfirmation(u8),
    Control(ControlAction),
}

impl Inbound {
    pub fn parse_line(line: &str, topics: &TopicConfig) -> Result<Self, MessageError> {
        let envelope: Envelope = serde_json::from_str(line)?;
        Self::from_envelope(envelope, topics)
    }

    pub fn from_envelope(envelope: Envelope, topics: &TopicConfig) -> Result<Self, MessageError> {
        let Envelope { topic, payload } = envelope;
        if topic == topics.telemetry {
            Ok(Inbound::Telemetry(payload))
        } else if topic == topics.lane {
            parse_lane(&payload).map(Inbound::LaneConfirmation)
        } else if topic == topics.control {
            let action = payload
                .get("action")
                .and_then(Value::as_str)
                .ok_or_else(|| MessageError::UnknownAction(payload.to_string()))?;
            action.parse().map(Inbound::Control)
        } else {
            Err(MessageError::UnknownTopic(topic))
        }
    }
}

/// Bare integer, possibly sent as a string.
fn parse_lane(payload: &Value) -> Result<u8, MessageError> {
    let lane = match payload {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    lane.and_then(|l| u8::try_from(l).ok())
        .filter(|&l| l >= 1)
        .ok_or_else(|| MessageError::BadLane(payload.to_string()))
}

/// Read envelopes from stdin until EOF or until the receiver is gone.
pub async fn read_stdin(tx: mpsc::Sender<Inbound>, topics: TopicConfig) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Ingress stream closed");
                break;
            }
            Err(e) => {
                warn!("Ingress read failed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match Inbound::parse_line(&line, &topics) {
            Ok(msg) => {
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!("Dropping inbound message: {}", e),
        }
    }
}

// ============================================================================
// EGRESS PAYLOADS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AdvisoryState {
    SamePath,
    Nearby,
    Idle,
}

/// `<m>m<s>s`, whole seconds.
pub fn format_eta(eta_s: f64) -> String {
    let total = eta_s.max(0.0) as u64;
    format!("{}m{}s", total / 60, total % 60)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    pub lanes: u8,
    pub current_lane: u8,
    pub avoid_dir: Option<AvoidDirection>,
    pub other_vehicle_lane: Option<u8>,
    pub state: AdvisoryState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionMessage {
    pub vehicle_id: String,
    pub current: GeoPoint,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackMessage {
    pub vehicle_id: String,
    pub current: GeoPoint,
    pub total_lanes: u8,
    pub current_lane: u8,
    /// `None` when nothing could be evaluated
    pub same_road_and_direction: Option<bool>,
    pub timestamp: String,
}

pub fn local_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

// ============================================================================
// PUBLISHERS
// ============================================================================

pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &str, payload: Value) -> Result<(), PeripheralError>;
}

pub fn publish_json<T: Serialize>(publisher: &dyn Publisher, topic: &str, message: &T) -> Result<(), PeripheralError> {
    let payload = serde_json::to_value(message)
        .map_err(|e| PeripheralError::Unavailable(format!("unserialisable payload: {}", e)))?;
    publisher.publish(topic, payload)
}

/// One envelope per line on stdout; the stdout lock keeps lines whole.
#[derive(Debug, Default)]
pub struct StdoutPublisher;

impl Publisher for StdoutPublisher {
    fn publish(&self, topic: &str, payload: Value) -> Result<(), PeripheralError> {
        let line = serde_json::to_string(&Envelope {
            topic: topic.to_string(),
            payload,
        })
        .map_err(|e| PeripheralError::Unavailable(format!("unserialisable envelope: {}", e)))?;
        debug!("→ {}", line);

        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{}", line)?;
        handle.flush()?;
        Ok(())
    }
}

/// Keeps every published envelope in memory.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryPublisher {
    sent: parking_lot::Mutex<Vec<Envelope>>,
}

#[cfg(test)]
impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().clone()
    }

    pub fn on_topic(&self, topic: &str) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .filter(|e| e.topic == topic)
            .map(|e| e.payload.clone())
            .collect()
    }
}

#[cfg(test)]
impl Publisher for MemoryPublisher {
    fn publish(&self, topic: &str, payload: Value) -> Result<(), PeripheralError> {
        self.sent.lock().push(Envelope {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_route_by_topic() {
        let topics = TopicConfig::default();
        let t = Inbound::parse_line(r#"{"topic":"ambulance/vehicles","payload":{"current":{}}}"#, &topics).unwrap();
        assert!(matches!(t, Inbound::Telemetry(_)));

        let l = Inbound::parse_line(r#"{"topic":"car/current_lane","payload":3}"#, &topics).unwrap();
        assert_eq!(l, Inbound::LaneConfirmation(3));
        let l = Inbound::parse_line(r#"{"topic":"car/current_lane","payload":"2"}"#, &topics).unwrap();
        assert_eq!(l, Inbound::LaneConfirmation(2));

        let c = Inbound::parse_line(r#"{"topic":"car/control","payload":{"action":"toggle_stop"}}"#, &topics).unwrap();
        assert_eq!(c, Inbound::Control(ControlAction::ToggleStop));
    }

    #[test]
    fn test_rejects_bad_input() {
        let topics = TopicConfig::default();
        assert!(matches!(
            Inbound::parse_line("not json", &topics),
            Err(MessageError::Json(_))
        ));
        assert!(matches!(
            Inbound::parse_line(r#"{"topic":"x/y","payload":1}"#, &topics),
            Err(MessageError::UnknownTopic(_))
        ));
        assert!(matches!(
            Inbound::parse_line(r#"{"topic":"car/current_lane","payload":0}"#, &topics),
            Err(MessageError::BadLane(_))
        ));
        assert!(matches!(
            Inbound::parse_line(r#"{"topic":"car/control","payload":{"action":"fly"}}"#, &topics),
            Err(MessageError::UnknownAction(_))
        ));
    }

    #[test]
    fn test_eta_format() {
        assert_eq!(format_eta(14.0), "0m14s");
        assert_eq!(format_eta(125.7), "2m5s");
    }

    #[test]
    fn test_status_shape() {
        let msg = StatusMessage {
            lanes: 3,
            current_lane: 2,
            avoid_dir: Some(AvoidDirection::Right),
            other_vehicle_lane: Some(2),
            state: AdvisoryState::SamePath,
            eta: Some(format_eta(75.0)),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"lanes": 3, "currentLane": 2, "avoidDir": 1, "otherVehicleLane": 2,
                   "state": "samePath", "eta": "1m15s"})
        );

        let idle = StatusMessage {
            avoid_dir: None,
            other_vehicle_lane: None,
            state: AdvisoryState::Idle,
            eta: None,
            ..msg
        };
        let v = serde_json::to_value(&idle).unwrap();
        assert_eq!(v["avoidDir"], Value::Null);
        assert!(v.get("eta").is_none());
        assert_eq!(v["state"], "idle");
    }

    #[test]
    fn test_feedback_shape() {
        let msg = FeedbackMessage {
            vehicle_id: "22ga 2222".to_string(),
            current: GeoPoint::new(37.5, 127.0),
            total_lanes: 3,
            current_lane: 2,
            same_road_and_direction: Some(true),
            timestamp: local_timestamp(),
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["vehicleId"], "22ga 2222");
        assert_eq!(v["current"], json!({"lat": 37.5, "lng": 127.0}));
        assert_eq!(v["sameRoadAndDirection"], true);
        assert_eq!(v["timestamp"].as_str().unwrap().len(), 19);
    }
}
