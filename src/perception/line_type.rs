// src/perception/line_type.rs
//
// Solid vs. dashed classification of a lane boundary.
//
// A fixed-width strip of the marking mask is sampled along the line axis and
// collapsed to a 1D brightness profile. After a moving average and a
// relative threshold, the on/off run structure decides:
//   solid   → high coverage and no gap longer than a few pixels
//   dashed  → several long gaps and coverage clearly below "full"
//   else    → plain coverage split

use super::lines::GuideLine;
use super::mask::value_at;
use crate::types::LineTypeConfig;
use image::GrayImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineType {
    Solid,
    Dashed,
}

/// Run-length statistics of a binarized profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileStats {
    pub coverage: f32,
    pub longest_gap: usize,
    pub long_gaps: usize,
}

/// Mean mask value across the strip for each step along the line, bottom to top.
pub fn sample_strip(mask: &GrayImage, line: &GuideLine, cfg: &LineTypeConfig) -> Option<Vec<f32>> {
    let length = line.length();
    if !length.is_finite() || length < cfg.min_strip_length {
        return None;
    }
    let ux = (line.x_top - line.x_bottom) / length;
    let uy = (line.y_top - line.y_bottom) / length;
    let (nx, ny) = (-uy, ux);
    let width = cfg.strip_width.max(1);
    let half = width as f32 / 2.0;

    let mut profile = Vec::with_capacity(length as usize);
    for i in 0..length as usize {
        let px = line.x_bottom + ux * i as f32;
        let py = line.y_bottom + uy * i as f32;
        let (ix, iy) = (px.round() as i64, py.round() as i64);
        if ix < 0 || iy < 0 || ix >= mask.width() as i64 || iy >= mask.height() as i64 {
            continue;
        }
        let sum: u32 = (0..width)
            .map(|k| {
                let off = k as f32 - half + 0.5;
                value_at(mask, (px + nx * off).round() as i64, (py + ny * off).round() as i64) as u32
            })
            .sum();
        profile.push(sum as f32 / width as f32);
    }

    if profile.len() < cfg.min_profile_length {
        return None;
    }
    Some(profile)
}

/// Zero-padded centred moving average.
fn moving_average(values: &[f32], window: usize) -> Vec<f32> {
    let k = window.max(1);
    let half = k / 2;
    let n = values.len() as i64;
    (0..n)
        .map(|i| {
            let start = i - half as i64;
            let sum: f32 = (start..start + k as i64)
                .filter(|&j| j >= 0 && j < n)
                .map(|j| values[j as usize])
                .sum();
            sum / k as f32
        })
        .collect()
}

pub fn profile_stats(binary: &[bool], long_gap: usize) -> ProfileStats {
    if binary.is_empty() {
        return ProfileStats {
            coverage: 0.0,
            longest_gap: 0,
            long_gaps: 0,
        };
    }

    let on = binary.iter().filter(|&&b| b).count();
    let mut longest_gap = 0;
    let mut long_gaps = 0;
    let mut run = 0;
    for &b in binary.iter().chain(std::iter::once(&true)) {
        if b {
            if run > 0 {
                longest_gap = longest_gap.max(run);
                if run >= long_gap {
                    long_gaps += 1;
                }
            }
            run = 0;
        } else {
            run += 1;
        }
    }

    ProfileStats {
        coverage: on as f32 / binary.len() as f32,
        longest_gap,
        long_gaps,
    }
}

/// `None` when the profile carries no marking at all.
pub fn classify_profile(profile: &[f32], cfg: &LineTypeConfig) -> Option<LineType> {
    let smooth = moving_average(profile, cfg.smooth_window);
    let peak = smooth.iter().cloned().fold(0.0f32, f32::max);
    if peak <= 0.0 {
        return None;
    }
    let threshold = cfg.binarize_fraction * peak;
    let binary: Vec<bool> = smooth.iter().map(|&v| v > threshold).collect();
    let stats = profile_stats(&binary, cfg.long_gap);

    if stats.coverage >= cfg.solid_coverage && stats.longest_gap <= cfg.solid_max_gap {
        return Some(LineType::Solid);
    }
    if stats.long_gaps >= cfg.min_dashed_gaps && stats.coverage < cfg.dashed_max_coverage {
        return Some(LineType::Dashed);
    }
    if stats.coverage > cfg.fallback_coverage {
        Some(LineType::Solid)
    } else {
        Some(LineType::Dashed)
    }
}

pub fn classify_line(mask: &GrayImage, line: &GuideLine, cfg: &LineTypeConfig) -> Option<LineType> {
    let profile = sample_strip(mask, line, cfg)?;
    classify_profile(&profile, cfg)
}

/// Lane number (1 = leftmost) from the boundary pattern.
///
/// Only three patterns are recognised, so at most three lanes can be told
/// apart; every other combination is unknown.
pub fn lane_index_for(left: Option<LineType>, right: Option<LineType>) -> Option<u8> {
    match (left?, right?) {
        (LineType::Solid, LineType::Dashed) => Some(1),
        (LineType::Dashed, LineType::Dashed) => Some(2),
        (LineType::Dashed, LineType::Solid) => Some(3),
        (LineType::Solid, LineType::Solid) => None,
    }
}
