// src/relative_position.rs
//
// Relative geometry between the ego vehicle and the higher-priority vehicle.
//
// Per evaluation:
//   1. Flatten the cached route into per-vertex points with duration shares
//   2. Project ego and other vehicle onto it (nearest vertex)
//   3. ETA = travel time between the two projections
//   4. On-route = ego residual within the proximity threshold
//   5. Heading vs. route tangent, debounced over N defined judgments
//   6. Straight-line distance
//   7. Sticky "crossed" latch: once inside the crossing radius, leaving it
//      again forces an idle result
//   8. same-road-and-direction, else nearby, else nothing

use crate::error::TelemetryError;
use crate::geo::{cosine_similarity, GeoPoint};
use crate::telemetry::{RouteIndex, TelemetrySnapshot};
use crate::types::RelativeConfig;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Result of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativeStatus {
    pub eta_s: Option<f64>,
    pub distance_m: Option<f64>,
    pub same_road_and_direction: bool,
    pub is_nearby: bool,
}

impl RelativeStatus {
    /// The other vehicle has already passed us.
    pub fn idle() -> Self {
        Self {
            eta_s: None,
            distance_m: None,
            same_road_and_direction: false,
            is_nearby: false,
        }
    }

    #[cfg(test)]
    pub fn is_idle(&self) -> bool {
        *self == Self::idle()
    }
}

/// Requires the same raw judgment `required` times in a row before it
/// becomes authoritative.
#[derive(Debug, Clone)]
pub struct DirectionDebouncer {
    required: u32,
    last_raw: Option<bool>,
    run_length: u32,
    stable: Option<bool>,
}

impl DirectionDebouncer {
    pub fn new(required: u32) -> Self {
        Self {
            required: required.max(1),
            last_raw: None,
            run_length: 0,
            stable: None,
        }
    }

    pub fn observe(&mut self, raw: bool) -> Option<bool> {
        if self.last_raw == Some(raw) {
            self.run_length += 1;
        } else {
            self.last_raw = Some(raw);
            self.run_length = 1;
        }
        if self.run_length >= self.required && self.stable != Some(raw) {
            debug!("Direction judgment settled: same_direction={}", raw);
            self.stable = Some(raw);
        }
        self.stable
    }

    pub fn stable(&self) -> Option<bool> {
        self.stable
    }
}

pub struct RelativePositionEngine {
    config: RelativeConfig,
    snapshot: Option<TelemetrySnapshot>,
    crossed: bool,
    direction: DirectionDebouncer,
}

impl RelativePositionEngine {
    pub fn new(config: RelativeConfig) -> Self {
        let direction = DirectionDebouncer::new(config.direction_stability);
        Self {
            config,
            snapshot: None,
            crossed: false,
            direction,
        }
    }

    /// Replace the cached telemetry. Invalid payloads leave the cache untouched.
    pub fn update(&mut self, payload: Value) -> Result<(), TelemetryError> {
        match TelemetrySnapshot::from_value(payload) {
            Ok(snapshot) => {
                debug!(
                    "Telemetry updated: other vehicle at {}, {} roads",
                    snapshot.current,
                    snapshot.segments.len()
                );
                self.snapshot = Some(snapshot);
                Ok(())
            }
            Err(e) => {
                warn!("Ignoring malformed telemetry: {}", e);
                Err(e)
            }
        }
    }

    #[cfg(test)]
    pub fn replace_snapshot(&mut self, snapshot: TelemetrySnapshot) {
        self.snapshot = Some(snapshot);
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> Option<&TelemetrySnapshot> {
        self.snapshot.as_ref()
    }

    #[cfg(test)]
    pub fn has_crossed(&self) -> bool {
        self.crossed
    }

    #[cfg(test)]
    pub fn stable_same_direction(&self) -> Option<bool> {
        self.direction.stable()
    }

    /// `None` when no usable telemetry is cached.
    pub fn evaluate(&mut self, me: GeoPoint, my_next: Option<GeoPoint>) -> Option<RelativeStatus> {
        let snapshot = self.snapshot.as_ref()?;
        let other = snapshot.current;
        let index = RouteIndex::build(&snapshot.segments);

        let (my_idx, residual_m) = index.nearest(me)?;
        let (other_idx, _) = index.nearest(other)?;

        let eta_s = index.eta_between(my_idx, other_idx);
        let on_route = residual_m <= self.config.proximity_threshold_m;
        debug!(
            "Projection: ego idx={} (residual {:.1} m), other idx={}, eta={:.1}s",
            my_idx, residual_m, other_idx, eta_s
        );

        if on_route {
            if let Some(raw) = self.raw_direction(&index, my_idx, me, my_next) {
                self.direction.observe(raw);
            }
        }

        let distance_m = me.distance_m(other);

        let threshold = self.config.crossing_threshold_m;
        if distance_m < threshold && !self.crossed {
            info!("🚑 Other vehicle within {:.0} m, marking as crossed", threshold);
            self.crossed = true;
        }
        if self.crossed && distance_m > threshold {
            debug!("Other vehicle already passed ({:.1} m), idle", distance_m);
            return Some(RelativeStatus::idle());
        }

        let same_road_and_direction = on_route && self.direction.stable() == Some(true);
        let is_nearby = !same_road_and_direction && distance_m <= self.config.nearby_threshold_m;

        Some(RelativeStatus {
            eta_s: Some(eta_s),
            distance_m: Some(distance_m),
            same_road_and_direction,
            is_nearby,
        })
    }

    /// Heading vs. route tangent. `None` inside the cosine dead-band or
    /// when the projection has no neighbours on both sides.
    fn raw_direction(
        &self,
        index: &RouteIndex,
        my_idx: usize,
        me: GeoPoint,
        my_next: Option<GeoPoint>,
    ) -> Option<bool> {
        let tangent = index.tangent_at(my_idx)?;
        let heading = my_next.map(|n| me.delta_to(n)).unwrap_or((0.0, 0.0));
        let cos = cosine_similarity(heading, tangent);
        let band = self.config.direction_cosine;
        if cos > band {
            Some(true)
        } else if cos < -band {
            Some(false)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::RoadSegment;

    // ~11 m per step northwards
    const STEP: f64 = 1e-4;

    fn pt(i: f64) -> GeoPoint {
        GeoPoint::new(37.5 + i * STEP, 127.0)
    }

    fn straight_route(n: usize, seconds_per_hop: f64) -> Vec<RoadSegment> {
        vec![RoadSegment {
            vertices: (0..n).map(|i| pt(i as f64)).collect(),
            duration_s: seconds_per_hop * (n - 1) as f64,
        }]
    }

    fn engine_with(other: GeoPoint, segments: Vec<RoadSegment>, crossing: f64) -> RelativePositionEngine {
        let mut engine = RelativePositionEngine::new(RelativeConfig {
            crossing_threshold_m: crossing,
            ..RelativeConfig::default()
        });
        engine.replace_snapshot(TelemetrySnapshot {
            destination: None,
            current: other,
            segments,
        });
        engine
    }

    #[test]
    fn test_empty_without_telemetry() {
        let mut engine = RelativePositionEngine::new(RelativeConfig::default());
        assert!(engine.evaluate(pt(0.0), Some(pt(1.0))).is_none());
    }

    #[test]
    fn test_malformed_update_keeps_previous_snapshot() {
        let mut engine = engine_with(pt(100.0), straight_route(20, 2.0), 30.0);
        let before = engine.snapshot().cloned();
        assert!(engine.update(serde_json::json!({"current": {"lat": 1.0}})).is_err());
        assert_eq!(engine.snapshot().cloned(), before);
    }

    #[test]
    fn test_eta_scenario_five_to_twelve() {
        // 20 points, 2 s per hop, ego at 5, other at 12 → 7 hops
        let mut engine = engine_with(pt(12.0), straight_route(20, 2.0), 30.0);
        let status = engine.evaluate(pt(5.0), Some(pt(6.0))).unwrap();
        assert_eq!(status.eta_s, Some(14.0));
    }

    #[test]
    fn test_eta_is_order_independent() {
        let mut a = engine_with(pt(12.0), straight_route(20, 2.0), 30.0);
        let mut b = engine_with(pt(5.0), straight_route(20, 2.0), 30.0);
        let ea = a.evaluate(pt(5.0), None).unwrap().eta_s;
        let eb = b.evaluate(pt(12.0), None).unwrap().eta_s;
        assert_eq!(ea, eb);
    }

    #[test]
    fn test_same_direction_needs_three_defined_judgments() {
        let mut engine = engine_with(pt(18.0), straight_route(20, 2.0), 30.0);

        let s1 = engine.evaluate(pt(5.0), Some(pt(6.0))).unwrap();
        let s2 = engine.evaluate(pt(5.0), Some(pt(6.0))).unwrap();
        assert!(!s1.same_road_and_direction && !s2.same_road_and_direction);

        // sideways heading: undefined, must not advance the run
        let undefined = engine.evaluate(pt(5.0), Some(GeoPoint::new(37.5 + 5.0 * STEP, 127.001)));
        assert!(!undefined.unwrap().same_road_and_direction);
        assert_eq!(engine.stable_same_direction(), None);

        let s3 = engine.evaluate(pt(5.0), Some(pt(6.0))).unwrap();
        assert!(s3.same_road_and_direction);
        assert!(!s3.is_nearby);
    }

    #[test]
    fn test_opposite_heading_is_not_same_direction() {
        let mut engine = engine_with(pt(18.0), straight_route(20, 2.0), 30.0);
        for _ in 0..3 {
            engine.evaluate(pt(5.0), Some(pt(4.0)));
        }
        assert_eq!(engine.stable_same_direction(), Some(false));
        let s = engine.evaluate(pt(5.0), Some(pt(4.0))).unwrap();
        assert!(!s.same_road_and_direction);
        // ~144 m apart
        assert!(s.is_nearby);
    }

    #[test]
    fn test_debouncer_flip_requires_full_run() {
        let mut d = DirectionDebouncer::new(3);
        for _ in 0..3 {
            d.observe(true);
        }
        assert_eq!(d.stable(), Some(true));
        d.observe(false);
        d.observe(false);
        assert_eq!(d.stable(), Some(true));
        d.observe(true);
        d.observe(false);
        d.observe(false);
        assert_eq!(d.stable(), Some(true));
        d.observe(false);
        assert_eq!(d.stable(), Some(false));
    }

    #[test]
    fn test_off_route_far_away_is_idle_like() {
        // ego ~5 km east of the route
        let mut engine = engine_with(pt(19.0), straight_route(20, 2.0), 30.0);
        let far = GeoPoint::new(37.5, 127.06);
        let s = engine.evaluate(far, None).unwrap();
        assert!(!s.same_road_and_direction);
        assert!(!s.is_nearby);
        assert!(s.eta_s.is_some());
        assert!(!engine.has_crossed());
    }

    #[test]
    fn test_crossing_sequence_forces_idle() {
        // other parked at index 0; ego at ~200 m, ~20 m, ~200 m
        let mut engine = engine_with(pt(0.0), straight_route(40, 2.0), 30.0);

        let far = engine.evaluate(pt(18.0), Some(pt(19.0))).unwrap();
        assert!(far.is_nearby);
        assert!(!engine.has_crossed());

        let close = engine.evaluate(pt(2.0), Some(pt(3.0))).unwrap();
        assert!(engine.has_crossed());
        assert!(!close.is_idle());

        for _ in 0..5 {
            let after = engine.evaluate(pt(18.0), Some(pt(19.0))).unwrap();
            assert_eq!(after, RelativeStatus::idle());
        }
    }

    #[test]
    fn test_no_forced_idle_without_crossing() {
        let mut engine = engine_with(pt(0.0), straight_route(40, 2.0), 30.0);
        for i in 3..40 {
            let s = engine.evaluate(pt(i as f64), Some(pt(i as f64 + 1.0))).unwrap();
            assert!(s.distance_m.is_some(), "forced idle at index {}", i);
        }
        assert!(!engine.has_crossed());
    }
}
