use crate::types::Config;
use anyhow::{bail, Context, Result};
use std::fs;

/// Upper bound for loop periods; keeps `Duration::from_secs_f64` in range.
const MAX_INTERVAL_SECS: f64 = 86_400.0;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Every float check is phrased so that NaN fails it.
    pub fn validate(&self) -> Result<()> {
        let r = &self.relative;
        if !(r.proximity_threshold_m > 0.0 && r.crossing_threshold_m > 0.0) {
            bail!("relative thresholds must be positive");
        }
        if !(r.nearby_threshold_m >= r.crossing_threshold_m) {
            bail!(
                "nearby_threshold_m ({}) must not be below crossing_threshold_m ({})",
                r.nearby_threshold_m,
                r.crossing_threshold_m
            );
        }
        if !(0.0..1.0).contains(&r.direction_cosine) {
            bail!("direction_cosine must lie in [0, 1)");
        }
        if r.direction_stability == 0 || self.stabilizer.confirm_frames == 0 {
            bail!("stability run lengths must be at least 1");
        }

        let p = &self.perception;
        for (name, alpha) in [("center_alpha", p.center_alpha), ("guide_alpha", p.guide_alpha)] {
            if !(alpha > 0.0 && alpha <= 1.0) {
                bail!("{} must lie in (0, 1], got {}", name, alpha);
            }
        }
        for (name, ratio) in [
            ("control_roi_top", p.control_roi_top),
            ("classification_roi_top", p.classification_roi_top),
            ("center_eval_height", p.center_eval_height),
        ] {
            if !(0.0..1.0).contains(&ratio) {
                bail!("{} must lie in [0, 1), got {}", name, ratio);
            }
        }
        if p.line_type.smooth_window == 0 || p.line_type.strip_width == 0 {
            bail!("line_type window sizes must be positive");
        }

        let c = &self.coordination;
        if !(2.0..=MAX_INTERVAL_SECS).contains(&c.eval_interval_secs) {
            bail!(
                "eval_interval_secs must lie in [2 s, 1 day], got {}",
                c.eval_interval_secs
            );
        }
        let step_ok = c.route_step_secs > 0.0 && c.route_step_secs <= MAX_INTERVAL_SECS;
        if !step_ok || c.inbound_capacity == 0 {
            bail!("route_step_secs and inbound_capacity must be positive");
        }
        if !(1..=3).contains(&self.vehicle.total_lanes) {
            bail!("total_lanes must be 1, 2 or 3");
        }
        let d = &self.drive;
        if !(d.min_speed <= d.initial_speed && d.initial_speed <= d.max_speed) {
            bail!("drive speeds must satisfy min <= initial <= max");
        }
        Ok(())
    }
}
