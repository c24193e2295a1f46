// src/types.rs

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub vehicle: VehicleConfig,
    pub topics: TopicConfig,
    pub relative: RelativeConfig,
    pub perception: PerceptionConfig,
    pub stabilizer: StabilizerConfig,
    pub drive: DriveConfig,
    pub coordination: CoordinationConfig,
    pub display: DisplayConfig,
    pub speech: SpeechConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub id: String,
    /// JSON file holding the ego polyline as `[[lat, lng], ...]`
    pub route_path: String,
    pub total_lanes: u8,
    /// Lane assumed until the first confirmation arrives
    pub initial_lane: u8,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            id: "22ga 2222".to_string(),
            route_path: "car_coords.json".to_string(),
            total_lanes: 3,
            initial_lane: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    pub telemetry: String,
    pub lane: String,
    pub control: String,
    pub status: String,
    pub position: String,
    pub feedback: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            telemetry: "ambulance/vehicles".to_string(),
            lane: "car/current_lane".to_string(),
            control: "car/control".to_string(),
            status: "car/hud".to_string(),
            position: "normalcar/web/current".to_string(),
            feedback: "ambulance/feedback".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelativeConfig {
    /// Max residual (m) between ego and its route projection to count as on-route
    pub proximity_threshold_m: f64,
    /// Distance (m) under which the other vehicle is considered to have passed us
    pub crossing_threshold_m: f64,
    pub nearby_threshold_m: f64,
    /// Cosine dead-band; |cos| <= this leaves the direction judgment undefined
    pub direction_cosine: f64,
    pub direction_stability: u32,
}

impl Default for RelativeConfig {
    fn default() -> Self {
        Self {
            proximity_threshold_m: 30.0,
            crossing_threshold_m: 30.0,
            nearby_threshold_m: 500.0,
            direction_cosine: 0.2,
            direction_stability: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptionConfig {
    pub enabled: bool,
    /// Image file or directory of frames; a device index ("0") or video file
    /// needs the `camera` feature
    pub camera_source: String,
    pub frame_width: usize,
    pub frame_height: usize,
    pub fps: u32,

    // White marking mask (HSV, saturation in percent, value 0-255)
    pub white_max_saturation: f32,
    pub white_min_value: f32,

    pub control_roi_top: f32,
    pub classification_roi_top: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    pub hough_threshold: u32,
    pub hough_suppression_radius: u32,
    pub hough_min_length: f32,
    pub hough_max_gap: f32,
    pub min_abs_slope: f32,
    pub center_eval_height: f32,

    pub line_type: LineTypeConfig,

    pub center_alpha: f32,
    pub guide_alpha: f32,

    /// TrueType font for the overlay banner; empty draws a marker box
    pub overlay_font: String,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            camera_source: "0".to_string(),
            frame_width: 640,
            frame_height: 360,
            fps: 24,
            white_max_saturation: 15.7,
            white_min_value: 200.0,
            control_roi_top: 0.62,
            classification_roi_top: 0.35,
            canny_low: 60.0,
            canny_high: 150.0,
            hough_threshold: 30,
            hough_suppression_radius: 8,
            hough_min_length: 20.0,
            hough_max_gap: 8.0,
            min_abs_slope: 0.3,
            center_eval_height: 0.9,
            line_type: LineTypeConfig::default(),
            center_alpha: 0.30,
            guide_alpha: 0.20,
            overlay_font: "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LineTypeConfig {
    pub strip_width: usize,
    pub min_strip_length: f32,
    pub min_profile_length: usize,
    pub smooth_window: usize,
    pub binarize_fraction: f32,
    pub solid_coverage: f32,
    pub solid_max_gap: usize,
    pub long_gap: usize,
    pub min_dashed_gaps: usize,
    pub dashed_max_coverage: f32,
    pub fallback_coverage: f32,
}

impl Default for LineTypeConfig {
    fn default() -> Self {
        Self {
            strip_width: 16,
            min_strip_length: 20.0,
            min_profile_length: 10,
            smooth_window: 9,
            binarize_fraction: 0.3,
            solid_coverage: 0.78,
            solid_max_gap: 18,
            long_gap: 20,
            min_dashed_gaps: 2,
            dashed_max_coverage: 0.85,
            fallback_coverage: 0.72,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizerConfig {
    pub confirm_frames: u32,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self { confirm_frames: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub start_stopped: bool,
    pub initial_speed: f32,
    pub speed_step: f32,
    pub min_speed: f32,
    pub max_speed: f32,
    /// Offsets inside this band (px) drive straight
    pub deadband_px: f32,
    /// Offsets beyond this (px) are treated as a lost track and drive straight
    pub offset_lock_px: f32,
    pub camera_fov_deg: f32,
    pub manual_turn_angle_deg: f32,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            start_stopped: false,
            initial_speed: 0.20,
            speed_step: 0.05,
            min_speed: 0.1,
            max_speed: 1.0,
            deadband_px: 15.0,
            offset_lock_px: 80.0,
            camera_fov_deg: 62.0,
            manual_turn_angle_deg: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    /// Minimum spacing between relative-position evaluations
    pub eval_interval_secs: f64,
    /// How often the ego vehicle advances one waypoint
    pub route_step_secs: f64,
    pub inbound_capacity: usize,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            eval_interval_secs: 2.0,
            route_step_secs: 2.5,
            inbound_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub vehicle_name: String,
    pub vehicle_address: String,
    pub width: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            vehicle_name: "22ga 2222".to_string(),
            vehicle_address: "0.0.0.0".to_string(),
            width: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub language: String,
    pub cache_dir: String,
    pub synth_timeout_secs: u64,
    pub play_timeout_secs: u64,
    /// Player command; the audio file path is appended
    pub player: Vec<String>,
    /// Local synthesiser used when the endpoint fails; `-w <file> <text>` is appended
    pub fallback: Vec<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "http://localhost:5002/api/tts".to_string(),
            language: "ko".to_string(),
            cache_dir: "/tmp/tts_cache".to_string(),
            synth_timeout_secs: 5,
            play_timeout_secs: 30,
            player: vec!["mpg123".to_string(), "-q".to_string()],
            fallback: vec!["espeak-ng".to_string(), "-v".to_string(), "ko".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// One RGB888 camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub timestamp_ms: f64,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: usize, height: usize, timestamp_ms: f64) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ms,
        }
    }

    #[inline]
    pub fn center_x(&self) -> f32 {
        (self.width / 2) as f32
    }
}
