// src/perception/mask.rs
//
// White lane-paint mask: low-saturation/bright threshold over the RGB frame,
// Gaussian blur, and top-of-frame cropping into a region of interest.

use crate::types::Frame;
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::filter::gaussian_blur_f32;
use imageproc::map::map_colors;
use imageproc::rect::Rect;

/// Sigma OpenCV derives for a 5x5 kernel.
const BLUR_SIGMA: f32 = 1.1;

const PAINT: Luma<u8> = Luma([255]);
const BACKGROUND: Luma<u8> = Luma([0]);

/// The frame buffer as an `RgbImage`; `None` if it does not match the
/// declared size.
pub fn frame_image(frame: &Frame) -> Option<RgbImage> {
    RgbImage::from_raw(frame.width as u32, frame.height as u32, frame.data.clone())
}

/// Saturation in percent and value (brightest channel, 0-255) of one pixel.
#[inline]
pub fn saturation_value(px: Rgb<u8>) -> (f32, u8) {
    let [r, g, b] = px.0;
    let hi = r.max(g).max(b);
    let lo = r.min(g).min(b);
    if hi == 0 {
        return (0.0, 0);
    }
    (100.0 * f32::from(hi - lo) / f32::from(hi), hi)
}

/// 255 where the pixel looks like white paint (low saturation, bright).
pub fn white_mask(rgb: &RgbImage, max_saturation: f32, min_value: f32) -> GrayImage {
    map_colors(rgb, |px| {
        let (s, v) = saturation_value(px);
        if s <= max_saturation && f32::from(v) >= min_value {
            PAINT
        } else {
            BACKGROUND
        }
    })
}

pub fn blur(mask: &GrayImage) -> GrayImage {
    gaussian_blur_f32(mask, BLUR_SIGMA)
}

/// Zero every row above `top_ratio * height`.
pub fn apply_roi_top(src: &GrayImage, top_ratio: f32) -> GrayImage {
    let y_top = roi_top_row(src.height() as usize, top_ratio) as u32;
    let mut roi = src.clone();
    if y_top > 0 && src.width() > 0 {
        draw_filled_rect_mut(&mut roi, Rect::at(0, 0).of_size(src.width(), y_top), BACKGROUND);
    }
    roi
}

#[inline]
pub fn roi_top_row(height: usize, top_ratio: f32) -> usize {
    ((height as f32 * top_ratio) as usize).min(height)
}

/// Mask value at signed coordinates; anything outside reads as 0.
#[inline]
pub fn value_at(mask: &GrayImage, x: i64, y: i64) -> u8 {
    if x < 0 || y < 0 {
        return 0;
    }
    mask.get_pixel_checked(x as u32, y as u32).map_or(0, |p| p.0[0])
}
