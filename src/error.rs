// src/error.rs
//
// Domain error taxonomy. None of these is fatal to a running loop:
//   - TelemetryError   → evaluation yields nothing, cached snapshot kept
//   - PerceptionError  → frame yields "no lane", smoothed state kept
//   - PeripheralError  → recorded and skipped
//   - MessageError     → inbound message dropped

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("telemetry has no current position")]
    MissingPosition,

    #[error("telemetry has no route")]
    MissingRoute,

    #[error("road {road} has a malformed vertex list ({len} values)")]
    MalformedVertexes { road: usize, len: usize },

    #[error("telemetry contains a non-finite coordinate or duration")]
    NonFinite,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PerceptionError {
    #[error("frame is empty ({width}x{height})")]
    EmptyFrame { width: usize, height: usize },

    #[error("frame buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum PeripheralError {
    #[error("peripheral I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("speech endpoint failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0} exited with {1}")]
    Command(String, std::process::ExitStatus),

    #[error("frame decode failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("peripheral unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("envelope is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no handler for topic {0}")]
    UnknownTopic(String),

    #[error("lane payload {0} is not a lane number")]
    BadLane(String),

    #[error("unknown control action {0}")]
    UnknownAction(String),
}
