// src/perception/overlay.rs
//
// Annotation of the RGB frame: control lines, smoothed guide lines, the
// smoothed lane center, or a "LANE NOT DETECTED" banner.

use super::lines::GuideLine;
use super::mask::frame_image;
use crate::types::Frame;
use ab_glyph::FontArc;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::{debug, warn};

pub const CONTROL_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const GUIDE_COLOR: Rgb<u8> = Rgb([0, 255, 255]);
pub const CENTER_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
pub const NO_LANE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

const NO_LANE_TEXT: &str = "LANE NOT DETECTED";
const TEXT_SCALE: f32 = 28.0;

/// Load the banner font. An empty path or an unreadable file leaves the
/// overlay with a plain marker box instead of text.
pub fn load_font(path: &str) -> Option<FontArc> {
    if path.is_empty() {
        return None;
    }
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Overlay font {} unavailable: {}", path, e);
            return None;
        }
    };
    match FontArc::try_from_vec(bytes) {
        Ok(font) => {
            debug!("Overlay font loaded from {}", path);
            Some(font)
        }
        Err(e) => {
            warn!("Overlay font {} unreadable: {}", path, e);
            None
        }
    }
}

/// Line of the given thickness, built from parallel one-pixel segments.
/// Non-finite or wildly extrapolated endpoints are skipped.
pub fn draw_line(canvas: &mut RgbImage, from: (f32, f32), to: (f32, f32), color: Rgb<u8>, thickness: u32) {
    let limit = 4.0 * (canvas.width() + canvas.height()) as f32;
    if [from.0, from.1, to.0, to.1].iter().any(|v| !v.is_finite() || v.abs() > limit) {
        return;
    }
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let len = dx.hypot(dy);
    let (nx, ny) = if len > 0.0 { (-dy / len, dx / len) } else { (1.0, 0.0) };

    let half = (thickness.max(1) as f32 - 1.0) / 2.0;
    for k in 0..thickness.max(1) {
        let off = k as f32 - half;
        draw_line_segment_mut(
            canvas,
            (from.0 + nx * off, from.1 + ny * off),
            (to.0 + nx * off, to.1 + ny * off),
            color,
        );
    }
}

fn draw_guide(canvas: &mut RgbImage, line: &GuideLine, color: Rgb<u8>, thickness: u32) {
    draw_line(
        canvas,
        (line.x_bottom, line.y_bottom),
        (line.x_top, line.y_top),
        color,
        thickness,
    );
}

pub struct OverlayInput<'a> {
    pub left_control: Option<&'a GuideLine>,
    pub right_control: Option<&'a GuideLine>,
    pub left_guide: Option<&'a GuideLine>,
    pub right_guide: Option<&'a GuideLine>,
    pub smoothed_center_x: Option<f32>,
}

pub fn annotate(frame: &Frame, input: &OverlayInput<'_>, font: Option<&FontArc>) -> Frame {
    let Some(mut canvas) = frame_image(frame) else {
        return frame.clone();
    };

    for line in [input.left_control, input.right_control].into_iter().flatten() {
        draw_guide(&mut canvas, line, CONTROL_COLOR, 3);
    }
    for line in [input.left_guide, input.right_guide].into_iter().flatten() {
        draw_guide(&mut canvas, line, GUIDE_COLOR, 2);
    }

    let h = canvas.height() as f32;
    match (input.smoothed_center_x, font) {
        (Some(cx), _) => draw_line(&mut canvas, (cx, h * 0.8), (cx, h), CENTER_COLOR, 2),
        (None, Some(font)) => draw_text_mut(&mut canvas, NO_LANE_COLOR, 50, 30, TEXT_SCALE, font, NO_LANE_TEXT),
        (None, None) => draw_filled_rect_mut(&mut canvas, Rect::at(10, 10).of_size(40, 24), NO_LANE_COLOR),
    }

    Frame::new(canvas.into_raw(), frame.width, frame.height, frame.timestamp_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(w: usize, h: usize) -> Frame {
        Frame::new(vec![0; w * h * 3], w, h, 0.0)
    }

    fn pixel(frame: &Frame, x: usize, y: usize) -> Rgb<u8> {
        let i = (y * frame.width + x) * 3;
        Rgb([frame.data[i], frame.data[i + 1], frame.data[i + 2]])
    }

    fn no_lines(center: Option<f32>) -> OverlayInput<'static> {
        OverlayInput {
            left_control: None,
            right_control: None,
            left_guide: None,
            right_guide: None,
            smoothed_center_x: center,
        }
    }

    #[test]
    fn test_draw_line_clips_and_thickens() {
        let mut canvas = RgbImage::new(20, 20);
        draw_line(&mut canvas, (-10.0, 5.0), (40.0, 5.0), Rgb([1, 2, 3]), 3);
        assert_eq!(*canvas.get_pixel(0, 5), Rgb([1, 2, 3]));
        assert_eq!(*canvas.get_pixel(19, 5), Rgb([1, 2, 3]));
        assert_eq!(*canvas.get_pixel(10, 4), Rgb([1, 2, 3]));
        assert_eq!(*canvas.get_pixel(10, 8), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_absurd_extrapolation_is_skipped() {
        let mut canvas = RgbImage::new(20, 20);
        draw_line(&mut canvas, (0.0, 0.0), (1e9, 5.0), Rgb([9, 9, 9]), 1);
        draw_line(&mut canvas, (0.0, 0.0), (f32::NAN, 5.0), Rgb([9, 9, 9]), 1);
        assert!(canvas.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn test_no_lane_marker_without_font() {
        let f = blank(64, 48);
        let out = annotate(&f, &no_lines(None), None);
        assert_eq!(pixel(&out, 15, 15), NO_LANE_COLOR);
        assert!(f.data.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_missing_font_file_falls_back() {
        assert!(load_font("").is_none());
        assert!(load_font("/nonexistent/font.ttf").is_none());
    }

    #[test]
    fn test_center_marker_drawn_at_bottom() {
        let f = blank(64, 50);
        let out = annotate(&f, &no_lines(Some(30.0)), None);
        assert_eq!(pixel(&out, 30, 45), CENTER_COLOR);
        assert_eq!(pixel(&out, 30, 30), Rgb([0, 0, 0]));
    }
}
