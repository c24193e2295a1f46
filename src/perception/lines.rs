// src/perception/lines.rs
//
// Segment → lane-boundary reduction: left/right split, one regression line
// per side, and the lane center at a fixed evaluation height.

use super::hough::Segment;
use super::mask::roi_top_row;

/// A lane boundary spanning a band, from the frame bottom up to the band top.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuideLine {
    pub x_bottom: f32,
    pub y_bottom: f32,
    pub x_top: f32,
    pub y_top: f32,
}

impl GuideLine {
    pub fn new(x_bottom: f32, y_bottom: f32, x_top: f32, y_top: f32) -> Self {
        Self {
            x_bottom,
            y_bottom,
            x_top,
            y_top,
        }
    }

    /// Horizontal position of the line at row `y`.
    pub fn x_at(&self, y: f32) -> f32 {
        let dy = self.y_top - self.y_bottom;
        if dy.abs() < f32::EPSILON {
            return self.x_bottom;
        }
        self.x_bottom + (y - self.y_bottom) * (self.x_top - self.x_bottom) / dy
    }

    pub fn length(&self) -> f32 {
        (self.x_top - self.x_bottom).hypot(self.y_top - self.y_bottom)
    }

    pub fn is_finite(&self) -> bool {
        self.x_bottom.is_finite() && self.y_bottom.is_finite() && self.x_top.is_finite() && self.y_top.is_finite()
    }
}

/// Partition segments by horizontal midpoint, dropping near-horizontal ones.
pub fn split_left_right(segments: &[Segment], center_x: f32, min_abs_slope: f32) -> (Vec<Segment>, Vec<Segment>) {
    let mut left = Vec::new();
    let mut right = Vec::new();
    for seg in segments {
        if seg.slope().abs() < min_abs_slope {
            continue;
        }
        if seg.mid_x() < center_x {
            left.push(*seg);
        } else {
            right.push(*seg);
        }
    }
    (left, right)
}

/// Least-squares fit of `x = m*y + c` over all segment endpoints,
/// extrapolated from the bottom row up to the band top.
pub fn average_line(segments: &[Segment], height: usize, roi_top: f32) -> Option<GuideLine> {
    if segments.is_empty() || height == 0 {
        return None;
    }

    let mut n = 0.0f64;
    let (mut sy, mut sx, mut syy, mut sxy) = (0.0f64, 0.0f64, 0.0f64, 0.0f64);
    for seg in segments {
        for (x, y) in [(seg.x1, seg.y1), (seg.x2, seg.y2)] {
            let (x, y) = (x as f64, y as f64);
            n += 1.0;
            sx += x;
            sy += y;
            syy += y * y;
            sxy += x * y;
        }
    }

    let denom = n * syy - sy * sy;
    if denom.abs() < 1e-6 {
        return None;
    }
    let m = (n * sxy - sx * sy) / denom;
    let c = (sx - m * sy) / n;

    let y_bottom = (height - 1) as f64;
    let y_top = roi_top_row(height, roi_top) as f64;
    let line = GuideLine::new(
        (m * y_bottom + c) as f32,
        y_bottom as f32,
        (m * y_top + c) as f32,
        y_top as f32,
    );
    line.is_finite().then_some(line)
}

/// Midpoint of both lines at `eval_ratio * height`; a single line stands in
/// for the center on its own.
pub fn lane_center_x(
    left: Option<&GuideLine>,
    right: Option<&GuideLine>,
    height: usize,
    eval_ratio: f32,
) -> Option<f32> {
    let y_eval = (height as f32 * eval_ratio).floor();
    match (left, right) {
        (Some(l), Some(r)) => Some((l.x_at(y_eval) + r.x_at(y_eval)) * 0.5),
        (Some(line), None) | (None, Some(line)) => Some(line.x_at(y_eval)),
        (None, None) => None,
    }
}
