// src/peripherals/frame_source.rs

use crate::error::PeripheralError;
use crate::types::{Frame, PerceptionConfig};
use anyhow::{bail, Result};
use image::imageops::{self, FilterType};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Exclusive owner of a frame producer.
pub trait FrameSource: Send {
    fn start(&mut self) -> Result<(), PeripheralError> {
        Ok(())
    }

    /// Next frame, or `None` when the source is exhausted.
    fn capture(&mut self) -> Result<Option<Frame>, PeripheralError>;

    fn stop(&mut self) {}
}

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "ppm"];

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Still images replayed as a frame stream: a single file, or every image in
/// a directory in file-name order. Frames are resized to the configured size.
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    next: usize,
    width: u32,
    height: u32,
    fps: f64,
}

impl ImageSequenceSource {
    /// Whether `source` names something this source can replay.
    pub fn accepts(source: &str) -> bool {
        let path = Path::new(source);
        path.is_dir() || (path.is_file() && is_image(path))
    }

    pub fn open(config: &PerceptionConfig) -> Result<Self> {
        let root = Path::new(config.camera_source.trim());
        let mut paths: Vec<PathBuf> = if root.is_dir() {
            WalkDir::new(root)
                .max_depth(1)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .map(|e| e.into_path())
                .filter(|p| p.is_file() && is_image(p))
                .collect()
        } else {
            vec![root.to_path_buf()]
        };
        paths.sort();

        if paths.is_empty() {
            bail!("no images found in {}", root.display());
        }
        info!("🖼️ Replaying {} image(s) from {}", paths.len(), root.display());

        Ok(Self {
            paths,
            next: 0,
            width: config.frame_width as u32,
            height: config.frame_height as u32,
            fps: f64::from(config.fps.max(1)),
        })
    }
}

impl FrameSource for ImageSequenceSource {
    fn capture(&mut self) -> Result<Option<Frame>, PeripheralError> {
        let Some(path) = self.paths.get(self.next).cloned() else {
            return Ok(None);
        };
        self.next += 1;

        let mut rgb = image::open(&path)?.to_rgb8();
        if rgb.dimensions() != (self.width, self.height) {
            rgb = imageops::resize(&rgb, self.width, self.height, FilterType::Triangle);
        }
        let timestamp_ms = (self.next - 1) as f64 / self.fps * 1000.0;
        Ok(Some(Frame::new(
            rgb.into_raw(),
            self.width as usize,
            self.height as usize,
            timestamp_ms,
        )))
    }

    fn stop(&mut self) {
        if self.next < self.paths.len() {
            warn!("Image replay stopped at {}/{}", self.next, self.paths.len());
        }
    }
}

#[cfg(feature = "camera")]
pub use camera::CameraSource;

#[cfg(feature = "camera")]
mod camera {
    use super::FrameSource;
    use crate::error::PeripheralError;
    use crate::types::{Frame, PerceptionConfig};
    use anyhow::{bail, Context, Result};
    use opencv::{
        core::{self, Mat},
        imgproc,
        prelude::*,
        videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst},
    };
    use tracing::info;

    fn cv_err(e: opencv::Error) -> PeripheralError {
        PeripheralError::Unavailable(format!("camera: {}", e))
    }

    /// V4L device (numeric source) or video file, delivered as RGB888 at the
    /// configured size.
    pub struct CameraSource {
        cap: VideoCapture,
        width: usize,
        height: usize,
        fps: f64,
        frame_index: u64,
    }

    impl CameraSource {
        pub fn open(config: &PerceptionConfig) -> Result<Self> {
            let source = config.camera_source.trim();
            info!("📷 Opening camera source {}", source);

            let mut cap = match source.parse::<i32>() {
                Ok(index) => VideoCapture::new(index, videoio::CAP_ANY),
                Err(_) => VideoCapture::from_file(source, videoio::CAP_ANY),
            }
            .with_context(|| format!("Failed to open camera source {}", source))?;

            if !cap.is_opened()? {
                bail!("camera source {} is not available", source);
            }

            cap.set(videoio::CAP_PROP_FRAME_WIDTH, config.frame_width as f64)?;
            cap.set(videoio::CAP_PROP_FRAME_HEIGHT, config.frame_height as f64)?;
            cap.set(videoio::CAP_PROP_FPS, config.fps as f64)?;

            let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)?;
            info!(
                "Camera ready: {}x{} @ {:.1} FPS",
                config.frame_width, config.frame_height, fps
            );

            Ok(Self {
                cap,
                width: config.frame_width,
                height: config.frame_height,
                fps: if fps > 0.0 { fps } else { config.fps as f64 },
                frame_index: 0,
            })
        }
    }

    impl FrameSource for CameraSource {
        fn capture(&mut self) -> Result<Option<Frame>, PeripheralError> {
            let mut mat = Mat::default();
            if !VideoCaptureTrait::read(&mut self.cap, &mut mat).map_err(cv_err)? || mat.empty() {
                return Ok(None);
            }

            let size = mat.size().map_err(cv_err)?;
            let mut sized = Mat::default();
            if size.width as usize != self.width || size.height as usize != self.height {
                imgproc::resize(
                    &mat,
                    &mut sized,
                    core::Size::new(self.width as i32, self.height as i32),
                    0.0,
                    0.0,
                    imgproc::INTER_LINEAR,
                )
                .map_err(cv_err)?;
            } else {
                sized = mat;
            }

            let mut rgb = Mat::default();
            imgproc::cvt_color(&sized, &mut rgb, imgproc::COLOR_BGR2RGB, 0).map_err(cv_err)?;
            let data = rgb.data_bytes().map_err(cv_err)?.to_vec();

            self.frame_index += 1;
            let timestamp_ms = self.frame_index as f64 / self.fps * 1000.0;
            Ok(Some(Frame::new(data, self.width, self.height, timestamp_ms)))
        }

        fn stop(&mut self) {
            if let Err(e) = self.cap.release() {
                tracing::warn!("Camera release failed: {}", e);
            }
            info!("📷 Camera stopped");
        }
    }
}
