// src/perception/mod.rs

pub mod hough;
pub mod line_type;
pub mod lines;
pub mod mask;
pub mod overlay;
pub mod pipeline;
pub mod smoothing;

pub use pipeline::{FrameOutcome, LanePerceptionPipeline};
