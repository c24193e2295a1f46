// src/perception/hough.rs
//
// Line-segment detection over an edge map.
//
// `imageproc` votes in (r, theta) space and returns the surviving infinite
// lines. Each line is then walked across the image to cut it into concrete
// segments: runs of edge pixels whose internal gaps do not exceed `max_gap`,
// kept when at least `min_length` long. Pixels taken by an emitted segment
// are not reused by a later line, so near-duplicates collapse.

use image::GrayImage;
use imageproc::hough::{detect_lines, LineDetectionOptions, PolarLine};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Segment {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn length(&self) -> f32 {
        (self.x2 - self.x1).hypot(self.y2 - self.y1)
    }

    /// dy/dx; infinite for vertical segments.
    pub fn slope(&self) -> f32 {
        let dx = self.x2 - self.x1;
        if dx == 0.0 {
            f32::INFINITY
        } else {
            (self.y2 - self.y1) / dx
        }
    }

    pub fn mid_x(&self) -> f32 {
        (self.x1 + self.x2) * 0.5
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HoughParams {
    pub threshold: u32,
    pub suppression_radius: u32,
    pub min_length: f32,
    pub max_gap: f32,
}

pub fn detect_segments(edges: &GrayImage, params: &HoughParams) -> Vec<Segment> {
    let lines = detect_lines(
        edges,
        LineDetectionOptions {
            vote_threshold: params.threshold.max(1),
            suppression_radius: params.suppression_radius,
        },
    );

    let mut taken = vec![false; edges.width() as usize * edges.height() as usize];
    let mut segments = Vec::new();
    for line in &lines {
        walk_line(edges, &mut taken, line, params, &mut segments);
    }
    segments
}

struct Run {
    start: (f32, f32),
    end: (f32, f32),
    gap: f32,
    pixels: Vec<usize>,
}

/// Follow `x cos(t) + y sin(t) = r` along its dominant axis, accepting edge
/// pixels within one pixel across the line.
fn walk_line(edges: &GrayImage, taken: &mut [bool], line: &PolarLine, params: &HoughParams, out: &mut Vec<Segment>) {
    let (w, h) = (edges.width() as i64, edges.height() as i64);
    let theta = (line.angle_in_degrees as f32).to_radians();
    let (c, s) = (theta.cos(), theta.sin());
    let r = line.r;
    let steep = c.abs() > s.abs();
    let steps = if steep { h } else { w };

    let mut run: Option<Run> = None;
    let mut flush = |run: &mut Option<Run>, taken: &mut [bool], out: &mut Vec<Segment>| {
        if let Some(done) = run.take() {
            let seg = Segment::new(done.start.0, done.start.1, done.end.0, done.end.1);
            if seg.length() >= params.min_length {
                for p in done.pixels {
                    taken[p] = true;
                }
                out.push(seg);
            }
        }
    };

    for i in 0..steps {
        let (fx, fy) = if steep {
            let y = i as f32;
            ((r - y * s) / c, y)
        } else {
            let x = i as f32;
            (x, (r - x * c) / s)
        };
        let (px, py) = (fx.round() as i64, fy.round() as i64);

        let hit = [0i64, -1, 1].into_iter().find_map(|d| {
            let (qx, qy) = if steep { (px + d, py) } else { (px, py + d) };
            if qx < 0 || qy < 0 || qx >= w || qy >= h {
                return None;
            }
            let idx = (qy * w + qx) as usize;
            let on = edges.get_pixel(qx as u32, qy as u32).0[0] != 0;
            (on && !taken[idx]).then_some((idx, (qx as f32, qy as f32)))
        });

        match (hit, run.as_mut()) {
            (Some((idx, at)), Some(open)) => {
                open.end = at;
                open.gap = 0.0;
                open.pixels.push(idx);
            }
            (Some((idx, at)), None) => {
                run = Some(Run {
                    start: at,
                    end: at,
                    gap: 0.0,
                    pixels: vec![idx],
                });
            }
            (None, Some(open)) => {
                open.gap += 1.0;
                if open.gap > params.max_gap {
                    flush(&mut run, taken, out);
                }
            }
            (None, None) => {}
        }
    }
    flush(&mut run, taken, out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::draw_line_segment_mut;

    fn params() -> HoughParams {
        HoughParams {
            threshold: 30,
            suppression_radius: 8,
            min_length: 20.0,
            max_gap: 8.0,
        }
    }

    fn draw(img: &mut GrayImage, from: (f32, f32), to: (f32, f32)) {
        draw_line_segment_mut(img, from, to, Luma([255]));
    }

    #[test]
    fn test_single_diagonal_line() {
        let mut img = GrayImage::new(120, 100);
        draw(&mut img, (20.0, 90.0), (70.0, 20.0));
        let segs = detect_segments(&img, &params());
        assert!(!segs.is_empty());
        let longest = segs
            .iter()
            .max_by(|a, b| a.length().partial_cmp(&b.length()).unwrap())
            .unwrap();
        assert!(longest.length() > 60.0, "length {}", longest.length());
        assert!(longest.slope() < -1.0);
    }

    #[test]
    fn test_large_gap_splits_line() {
        let mut img = GrayImage::new(60, 200);
        draw(&mut img, (30.0, 0.0), (30.0, 60.0));
        draw(&mut img, (30.0, 120.0), (30.0, 199.0));
        let segs = detect_segments(&img, &params());
        assert!(segs.len() >= 2, "{:?}", segs);
        for seg in &segs {
            let (lo, hi) = (seg.y1.min(seg.y2), seg.y1.max(seg.y2));
            assert!(hi <= 60.0 || lo >= 120.0, "segment bridges the gap: {:?}", seg);
        }
    }

    #[test]
    fn test_short_blob_rejected() {
        let mut img = GrayImage::new(50, 50);
        draw(&mut img, (10.0, 10.0), (10.0, 20.0));
        assert!(detect_segments(&img, &params()).is_empty());
    }
}
