// src/telemetry.rs
//
// Other-vehicle telemetry: wire shape, validated snapshot, and the flattened
// per-vertex route index derived from it on every evaluation.
//
// Wire shape (directions-API style, vertexes interleaved lng,lat):
//   { dest, current: {lat, lng},
//     route: { routes: [ { sections: [ { roads: [ {vertexes, duration} ] } ] } ] } }

use crate::error::TelemetryError;
use crate::geo::GeoPoint;
use serde::Deserialize;
use serde_json::Value;

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
struct WireTelemetry {
    #[serde(default)]
    dest: Option<Value>,
    #[serde(default)]
    current: Option<WireLatLng>,
    #[serde(default, alias = "route_info")]
    route: Option<WireRoute>,
}

#[derive(Debug, Deserialize)]
struct WireLatLng {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct WireRoute {
    #[serde(default)]
    routes: Vec<WireRouteOption>,
}

#[derive(Debug, Deserialize)]
struct WireRouteOption {
    #[serde(default)]
    sections: Vec<WireSection>,
}

#[derive(Debug, Deserialize)]
struct WireSection {
    #[serde(default)]
    roads: Vec<WireRoad>,
}

#[derive(Debug, Deserialize)]
struct WireRoad {
    vertexes: Vec<f64>,
    duration: f64,
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// One road of the other vehicle's route.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadSegment {
    pub vertices: Vec<GeoPoint>,
    pub duration_s: f64,
}

/// Latest validated telemetry. Replaced wholesale, never merged.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    pub destination: Option<String>,
    pub current: GeoPoint,
    pub segments: Vec<RoadSegment>,
}

impl TelemetrySnapshot {
    pub fn from_value(value: Value) -> Result<Self, TelemetryError> {
        let wire: WireTelemetry = serde_json::from_value(value)?;
        Self::from_wire(wire)
    }

    fn from_wire(wire: WireTelemetry) -> Result<Self, TelemetryError> {
        let current = wire.current.ok_or(TelemetryError::MissingPosition)?;
        let current = GeoPoint::new(current.lat, current.lng);
        if !current.is_finite() {
            return Err(TelemetryError::NonFinite);
        }

        // Only the first (preferred) route option is followed.
        let option = wire
            .route
            .and_then(|r| r.routes.into_iter().next())
            .ok_or(TelemetryError::MissingRoute)?;

        let mut segments = Vec::new();
        for (road_idx, road) in option
            .sections
            .into_iter()
            .flat_map(|s| s.roads)
            .enumerate()
        {
            let len = road.vertexes.len();
            if len == 0 || len % 2 != 0 {
                return Err(TelemetryError::MalformedVertexes { road: road_idx, len });
            }
            if !road.duration.is_finite() || road.duration < 0.0 {
                return Err(TelemetryError::NonFinite);
            }
            let vertices: Vec<GeoPoint> = road
                .vertexes
                .chunks_exact(2)
                .map(|lng_lat| GeoPoint::new(lng_lat[1], lng_lat[0]))
                .collect();
            if !vertices.iter().all(GeoPoint::is_finite) {
                return Err(TelemetryError::NonFinite);
            }
            segments.push(RoadSegment {
                vertices,
                duration_s: road.duration,
            });
        }

        if segments.is_empty() {
            return Err(TelemetryError::MissingRoute);
        }

        let destination = wire.dest.map(|d| match d {
            Value::String(s) => s,
            other => other.to_string(),
        });

        Ok(Self {
            destination,
            current,
            segments,
        })
    }
}

// ============================================================================
// ROUTE INDEX
// ============================================================================

/// Flattened per-vertex view of a route.
///
/// `shares[i]` is the travel time of the sub-interval leaving point `i`. A
/// road's duration is split evenly over its own sub-intervals; the hop from
/// one road's last vertex to the next road's first vertex carries nothing.
#[derive(Debug, Clone)]
pub struct RouteIndex {
    points: Vec<GeoPoint>,
    shares: Vec<f64>,
}

impl RouteIndex {
    pub fn build(segments: &[RoadSegment]) -> Self {
        let total: usize = segments.iter().map(|s| s.vertices.len()).sum();
        let mut points = Vec::with_capacity(total);
        let mut shares = Vec::with_capacity(total);

        for segment in segments {
            let n = segment.vertices.len();
            let share = if n > 1 {
                segment.duration_s / (n - 1) as f64
            } else {
                segment.duration_s
            };
            for (k, vertex) in segment.vertices.iter().enumerate() {
                points.push(*vertex);
                shares.push(if n == 1 || k + 1 < n { share } else { 0.0 });
            }
        }

        Self { points, shares }
    }

    #[cfg(test)]
    pub fn with_shares(points: Vec<GeoPoint>, shares: Vec<f64>) -> Self {
        debug_assert_eq!(points.len(), shares.len());
        Self { points, shares }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Nearest vertex by haversine distance; ties go to the lowest index.
    pub fn nearest(&self, target: GeoPoint) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (i, p) in self.points.iter().enumerate() {
            let d = target.distance_m(*p);
            match best {
                Some((_, best_d)) if d >= best_d => {}
                _ => best = Some((i, d)),
            }
        }
        best
    }

    /// Travel time between two vertices, independent of argument order.
    pub fn eta_between(&self, a: usize, b: usize) -> f64 {
        let lo = a.min(b).min(self.shares.len());
        let hi = a.max(b).min(self.shares.len());
        self.shares[lo..hi].iter().sum()
    }

    /// Route direction at an interior vertex: successor minus predecessor.
    pub fn tangent_at(&self, index: usize) -> Option<(f64, f64)> {
        if index == 0 || index + 1 >= self.points.len() {
            return None;
        }
        Some(self.points[index - 1].delta_to(self.points[index + 1]))
    }
}
