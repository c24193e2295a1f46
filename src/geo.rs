// src/geo.rs

use serde::{Deserialize, Serialize};

/// Mean Earth radius, metres
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS-84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    #[inline]
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }

    /// Haversine great-circle distance in metres.
    pub fn distance_m(self, other: GeoPoint) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();

        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();

        let a = (d_lat * 0.5).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng * 0.5).sin().powi(2);

        2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
    }

    /// Planar (lng, lat) difference vector `other - self`.
    #[inline]
    pub fn delta_to(self, other: GeoPoint) -> (f64, f64) {
        (other.lng - self.lng, other.lat - self.lat)
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

/// Cosine of the angle between two 2D vectors; 0 if either is degenerate.
pub fn cosine_similarity(a: (f64, f64), b: (f64, f64)) -> f64 {
    let dot = a.0 * b.0 + a.1 * b.1;
    let mag_a = a.0.hypot(a.1);
    let mag_b = b.0.hypot(b.1);
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_distance() {
        let p = GeoPoint::new(37.4765, 126.9816);
        assert!(p.distance_m(p).abs() < 1e-9);
    }

    #[test]
    fn test_one_degree_latitude() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(1.0, 0.0);
        let d = a.distance_m(b);
        // 2πR / 360
        assert!((d - 111_194.9).abs() < 1.0, "got {}", d);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = GeoPoint::new(37.4765, 126.9816);
        let b = GeoPoint::new(37.5015, 126.9601);
        assert!((a.distance_m(b) - b.distance_m(a)).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity((1.0, 0.0), (2.0, 0.0)) - 1.0).abs() < 1e-12);
        assert!((cosine_similarity((1.0, 0.0), (-3.0, 0.0)) + 1.0).abs() < 1e-12);
        assert!(cosine_similarity((1.0, 0.0), (0.0, 5.0)).abs() < 1e-12);
        assert_eq!(cosine_similarity((0.0, 0.0), (1.0, 1.0)), 0.0);
    }
}
