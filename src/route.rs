// src/route.rs
//
// Ego route: a fixed polyline supplied from outside, plus a cursor that
// walks it one waypoint per step.

use crate::geo::GeoPoint;
use anyhow::{bail, Context, Result};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct RoutePolyline {
    points: Vec<GeoPoint>,
}

impl RoutePolyline {
    pub fn new(points: Vec<GeoPoint>) -> Self {
        Self { points }
    }

    /// Load `[[lat, lng], ...]`; pairs of the wrong arity are skipped.
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read route {}", path))?;
        let pairs: Vec<Vec<f64>> =
            serde_json::from_str(&contents).with_context(|| format!("Failed to parse route {}", path))?;

        let points: Vec<GeoPoint> = pairs
            .into_iter()
            .filter(|pair| pair.len() == 2)
            .map(|pair| GeoPoint::new(pair[0], pair[1]))
            .filter(GeoPoint::is_finite)
            .collect();

        if points.is_empty() {
            bail!("route {} contains no usable waypoints", path);
        }
        info!("📂 Loaded {} ego waypoints from {}", points.len(), path);
        Ok(Self { points })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn get(&self, index: usize) -> Option<GeoPoint> {
        self.points.get(index).copied()
    }
}

/// Shared position of the ego vehicle along its polyline.
#[derive(Debug, Clone)]
pub struct RouteCursor {
    route: Arc<RoutePolyline>,
    index: Arc<AtomicUsize>,
}

impl RouteCursor {
    pub fn new(route: RoutePolyline) -> Self {
        Self {
            route: Arc::new(route),
            index: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn index(&self) -> usize {
        self.index.load(Ordering::Acquire)
    }

    /// Current waypoint and its successor, or `None` once the route is exhausted.
    pub fn current(&self) -> Option<(GeoPoint, Option<GeoPoint>)> {
        let i = self.index();
        let here = self.route.get(i)?;
        Some((here, self.route.get(i + 1)))
    }

    /// Move one waypoint forward. Returns the waypoint just left, if any.
    pub fn advance(&self) -> Option<GeoPoint> {
        let i = self.index.fetch_add(1, Ordering::AcqRel);
        if i >= self.route.len() {
            // stay parked past the end
            self.index.store(self.route.len(), Ordering::Release);
        }
        self.route.get(i)
    }

    pub fn is_finished(&self) -> bool {
        self.index() >= self.route.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn line(n: usize) -> RoutePolyline {
        RoutePolyline::new((0..n).map(|i| GeoPoint::new(37.0 + i as f64 * 1e-4, 127.0)).collect())
    }

    #[test]
    fn test_load_skips_bad_pairs() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[[37.1, 127.1], [1.0], [37.2, 127.2, 5.0], [37.3, 127.3]]").unwrap();
        let route = RoutePolyline::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(route.len(), 2);
        assert_eq!(route.get(1), Some(GeoPoint::new(37.3, 127.3)));
    }

    #[test]
    fn test_load_rejects_empty_route() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[]").unwrap();
        assert!(RoutePolyline::load(file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_cursor_walks_and_parks() {
        let cursor = RouteCursor::new(line(2));
        let (here, next) = cursor.current().unwrap();
        assert_eq!(here, GeoPoint::new(37.0, 127.0));
        assert!(next.is_some());

        assert!(cursor.advance().is_some());
        let (_, next) = cursor.current().unwrap();
        assert!(next.is_none());

        assert!(cursor.advance().is_some());
        assert!(cursor.is_finished());
        assert!(cursor.current().is_none());
        assert!(cursor.advance().is_none());
        assert_eq!(cursor.index(), 2);
    }
}
