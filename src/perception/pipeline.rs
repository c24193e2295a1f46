// src/perception/pipeline.rs
//
// Per-frame lane perception.
//
//   frame ─► white mask ─► blur ─┬─► control band ──► edges ─► segments ─► L/R lines ─► center ─► EMA
//                                └─► classification band ─► edges ─► segments ─► L/R lines ─┬─► line types ─► lane index
//                                                                                            └─► EMA (display only)
//
// The lane index is always derived from the current frame's raw
// classification lines; the smoothed guide lines only feed the overlay.

use super::hough::{detect_segments, HoughParams};
use super::line_type::{classify_line, lane_index_for, LineType};
use super::lines::{average_line, lane_center_x, split_left_right, GuideLine};
use super::mask::{apply_roi_top, blur, frame_image, white_mask};
use super::overlay::{annotate, load_font, OverlayInput};
use super::smoothing::{CenterSmoother, GuideLineSmoother};
use crate::error::PerceptionError;
use crate::types::{Frame, PerceptionConfig};
use ab_glyph::FontArc;
use image::GrayImage;
use imageproc::edges::canny;
use tracing::debug;

/// Everything one frame produced. Offsets are `center - frame_center`,
/// positive to the right.
#[derive(Debug, Clone)]
pub struct LaneReading {
    pub annotated: Frame,
    pub raw_center_x: Option<f32>,
    pub smoothed_center_x: Option<f32>,
    pub raw_offset: Option<f32>,
    pub smoothed_offset: Option<f32>,
    pub left_control: Option<GuideLine>,
    pub right_control: Option<GuideLine>,
    pub left_guide: Option<GuideLine>,
    pub right_guide: Option<GuideLine>,
    pub left_type: Option<LineType>,
    pub right_type: Option<LineType>,
    pub current_lane: Option<u8>,
}

/// Why a frame produced only part of a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialCause {
    /// A classification-band boundary was not found on one or both sides
    MissingGuideLine,
    /// A boundary was found but its strip could not be classified
    UnclassifiedLine,
    /// Both types known but the pattern is not in the lane table
    UnknownLanePattern,
    /// Lane index resolved but no control line to steer by
    NoControlLines,
}

#[derive(Debug, Clone)]
pub enum FrameOutcome {
    Detected(LaneReading),
    Partial { reading: LaneReading, cause: PartialCause },
    Failed { cause: PerceptionError, smoothed_center_x: Option<f32> },
}

impl FrameOutcome {
    pub fn reading(&self) -> Option<&LaneReading> {
        match self {
            FrameOutcome::Detected(r) | FrameOutcome::Partial { reading: r, .. } => Some(r),
            FrameOutcome::Failed { .. } => None,
        }
    }

    pub fn current_lane(&self) -> Option<u8> {
        self.reading().and_then(|r| r.current_lane)
    }

    pub fn smoothed_center_x(&self) -> Option<f32> {
        match self {
            FrameOutcome::Failed { smoothed_center_x, .. } => *smoothed_center_x,
            other => other.reading().and_then(|r| r.smoothed_center_x),
        }
    }

    #[cfg(test)]
    pub fn is_detected(&self) -> bool {
        matches!(self, FrameOutcome::Detected(_))
    }
}

struct BandLines {
    roi: GrayImage,
    left: Option<GuideLine>,
    right: Option<GuideLine>,
}

pub struct LanePerceptionPipeline {
    config: PerceptionConfig,
    center: CenterSmoother,
    left_guide: GuideLineSmoother,
    right_guide: GuideLineSmoother,
    font: Option<FontArc>,
    frame_count: u64,
}

impl LanePerceptionPipeline {
    pub fn new(config: PerceptionConfig) -> Self {
        Self {
            center: CenterSmoother::new(config.center_alpha),
            left_guide: GuideLineSmoother::new(config.guide_alpha),
            right_guide: GuideLineSmoother::new(config.guide_alpha),
            font: load_font(&config.overlay_font),
            config,
            frame_count: 0,
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Never panics and never errors: an unusable frame becomes `Failed`
    /// with the prior smoothed center carried along.
    pub fn process_frame(&mut self, frame: &Frame) -> FrameOutcome {
        self.frame_count += 1;

        let rgb = match validate(frame) {
            Ok(rgb) => rgb,
            Err(cause) => {
                debug!("Frame {} rejected: {}", self.frame_count, cause);
                return FrameOutcome::Failed {
                    cause,
                    smoothed_center_x: self.center.current(),
                };
            }
        };

        let cfg = &self.config;
        let mask = blur(&white_mask(&rgb, cfg.white_max_saturation, cfg.white_min_value));
        let center_x = frame.center_x();

        let control = self.band_lines(&mask, cfg.control_roi_top, center_x);
        let class = self.band_lines(&mask, cfg.classification_roi_top, center_x);

        let left_type = class.left.as_ref().and_then(|l| classify_line(&class.roi, l, &cfg.line_type));
        let right_type = class.right.as_ref().and_then(|l| classify_line(&class.roi, l, &cfg.line_type));
        let current_lane = lane_index_for(left_type, right_type);

        let left_guide = self.left_guide.smooth(class.left);
        let right_guide = self.right_guide.smooth(class.right);

        let raw_center_x = lane_center_x(
            control.left.as_ref(),
            control.right.as_ref(),
            frame.height,
            self.config.center_eval_height,
        );
        let smoothed_center_x = self.center.smooth(raw_center_x);

        let annotated = annotate(
            frame,
            &OverlayInput {
                left_control: control.left.as_ref(),
                right_control: control.right.as_ref(),
                left_guide: left_guide.as_ref(),
                right_guide: right_guide.as_ref(),
                smoothed_center_x,
            },
            self.font.as_ref(),
        );

        debug!(
            "Frame {}: center raw={:?} smooth={:?}, types L={:?} R={:?}, lane={:?}",
            self.frame_count, raw_center_x, smoothed_center_x, left_type, right_type, current_lane
        );

        let reading = LaneReading {
            annotated,
            raw_center_x,
            smoothed_center_x,
            raw_offset: raw_center_x.map(|x| x - center_x),
            smoothed_offset: smoothed_center_x.map(|x| x - center_x),
            left_control: control.left,
            right_control: control.right,
            left_guide,
            right_guide,
            left_type,
            right_type,
            current_lane,
        };

        let cause = if current_lane.is_none() {
            Some(if class.left.is_none() || class.right.is_none() {
                PartialCause::MissingGuideLine
            } else if left_type.is_none() || right_type.is_none() {
                PartialCause::UnclassifiedLine
            } else {
                PartialCause::UnknownLanePattern
            })
        } else if raw_center_x.is_none() {
            Some(PartialCause::NoControlLines)
        } else {
            None
        };

        match cause {
            None => FrameOutcome::Detected(reading),
            Some(cause) => FrameOutcome::Partial { reading, cause },
        }
    }

    fn band_lines(&self, mask: &GrayImage, roi_top: f32, center_x: f32) -> BandLines {
        let cfg = &self.config;
        let roi = apply_roi_top(mask, roi_top);
        let edges = canny(&roi, cfg.canny_low, cfg.canny_high);
        let segments = detect_segments(
            &edges,
            &HoughParams {
                threshold: cfg.hough_threshold,
                suppression_radius: cfg.hough_suppression_radius,
                min_length: cfg.hough_min_length,
                max_gap: cfg.hough_max_gap,
            },
        );
        let (left, right) = split_left_right(&segments, center_x, cfg.min_abs_slope);
        BandLines {
            left: average_line(&left, mask.height() as usize, roi_top),
            right: average_line(&right, mask.height() as usize, roi_top),
            roi,
        }
    }
}

fn validate(frame: &Frame) -> Result<image::RgbImage, PerceptionError> {
    if frame.width == 0 || frame.height == 0 {
        return Err(PerceptionError::EmptyFrame {
            width: frame.width,
            height: frame.height,
        });
    }
    let expected = frame.width * frame.height * 3;
    if frame.data.len() != expected {
        return Err(PerceptionError::BufferSize {
            expected,
            actual: frame.data.len(),
        });
    }
    frame_image(frame).ok_or(PerceptionError::BufferSize {
        expected,
        actual: frame.data.len(),
    })
}
