// src/perception/smoothing.rs

use super::lines::GuideLine;

/// EMA over the lane-center x. A frame without a center holds the last value.
#[derive(Debug, Clone)]
pub struct CenterSmoother {
    alpha: f32,
    smoothed: Option<f32>,
}

impl CenterSmoother {
    pub fn new(alpha: f32) -> Self {
        Self { alpha, smoothed: None }
    }

    pub fn smooth(&mut self, raw: Option<f32>) -> Option<f32> {
        if let Some(x) = raw {
            let next = match self.smoothed {
                None => x,
                Some(prev) => self.alpha * x + (1.0 - self.alpha) * prev,
            };
            self.smoothed = Some(next);
        }
        self.smoothed
    }

    pub fn current(&self) -> Option<f32> {
        self.smoothed
    }
}

/// Component-wise EMA over a guide line, used for display continuity only.
#[derive(Debug, Clone)]
pub struct GuideLineSmoother {
    alpha: f32,
    smoothed: Option<GuideLine>,
}

impl GuideLineSmoother {
    pub fn new(alpha: f32) -> Self {
        Self { alpha, smoothed: None }
    }

    pub fn smooth(&mut self, raw: Option<GuideLine>) -> Option<GuideLine> {
        if let Some(new) = raw {
            let a = self.alpha;
            let mix = |p: f32, n: f32| (1.0 - a) * p + a * n;
            self.smoothed = Some(match self.smoothed {
                None => new,
                Some(prev) => GuideLine::new(
                    mix(prev.x_bottom, new.x_bottom),
                    mix(prev.y_bottom, new.y_bottom),
                    mix(prev.x_top, new.x_top),
                    mix(prev.y_top, new.y_top),
                ),
            });
        }
        self.smoothed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_initialises_then_blends() {
        let mut s = CenterSmoother::new(0.3);
        assert_eq!(s.smooth(None), None);
        assert_eq!(s.smooth(Some(100.0)), Some(100.0));
        let v = s.smooth(Some(200.0)).unwrap();
        assert!((v - 130.0).abs() < 1e-4);
    }

    #[test]
    fn test_center_holds_on_missing() {
        let mut s = CenterSmoother::new(0.3);
        s.smooth(Some(150.0));
        assert_eq!(s.smooth(None), Some(150.0));
        assert_eq!(s.current(), Some(150.0));
    }

    #[test]
    fn test_guide_line_componentwise() {
        let mut s = GuideLineSmoother::new(0.2);
        s.smooth(Some(GuideLine::new(0.0, 100.0, 50.0, 10.0)));
        let out = s.smooth(Some(GuideLine::new(100.0, 100.0, 50.0, 10.0))).unwrap();
        assert!((out.x_bottom - 20.0).abs() < 1e-4);
        assert_eq!(out.x_top, 50.0);
        assert_eq!(s.smooth(None), Some(out));
    }
}
