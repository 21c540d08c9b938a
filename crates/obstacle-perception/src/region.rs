//! Map-derived region-of-interest context.
//!
//! The region context is a refinement input: detectors use it to discard
//! returns that fall outside the drivable area.  When the map service is
//! disabled or fails, [`RegionContextProvider::get_context`] hands back an
//! empty context and logs a warning; it never fails the frame.

use std::sync::Arc;

use obstacle_types::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// A 2-D point in the world frame (metres).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A simple (non self-intersecting) polygon.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Polygon {
    pub points: Vec<Point2>,
}

impl Polygon {
    pub fn new(points: Vec<Point2>) -> Self {
        Self { points }
    }

    /// Even-odd ray casting point-in-polygon test.
    pub fn contains(&self, p: Point2) -> bool {
        let n = self.points.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (a, b) = (self.points[i], self.points[j]);
            if (a.y > p.y) != (b.y > p.y) {
                let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
                if p.x < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    /// `true` if any vertex lies within `radius` of `center`.
    fn is_near(&self, center: Point2, radius: f64) -> bool {
        let r2 = radius * radius;
        self.points.iter().any(|p| {
            let (dx, dy) = (p.x - center.x, p.y - center.y);
            dx * dx + dy * dy <= r2
        }) || self.contains(center)
    }
}

/// Polygons describing the relevant area around the sensor.  May be empty.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RegionContext {
    pub polygons: Vec<Polygon>,
}

impl RegionContext {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    /// `true` if `p` lies inside at least one polygon.
    pub fn contains(&self, p: Point2) -> bool {
        self.polygons.iter().any(|poly| poly.contains(p))
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MapError {
    #[error("map service unavailable: {0}")]
    Unavailable(String),

    #[error("no map data around ({x:.2}, {y:.2})")]
    NoData { x: f64, y: f64 },
}

/// External source of region polygons.
pub trait MapService: Send + Sync {
    fn get_region(&self, position: Vec3, forward_distance: f64) -> Result<Vec<Polygon>, MapError>;
}

/// An in-memory [`MapService`] backed by a fixed polygon set.
///
/// Returns every polygon with a vertex within `forward_distance` of the query
/// position (or containing it).
#[derive(Debug, Clone, Default)]
pub struct StaticMap {
    polygons: Vec<Polygon>,
}

impl StaticMap {
    pub fn new(polygons: Vec<Polygon>) -> Self {
        Self { polygons }
    }
}

impl MapService for StaticMap {
    fn get_region(&self, position: Vec3, forward_distance: f64) -> Result<Vec<Polygon>, MapError> {
        let center = Point2::new(position.x, position.y);
        Ok(self
            .polygons
            .iter()
            .filter(|poly| poly.is_near(center, forward_distance))
            .cloned()
            .collect())
    }
}

/// Supplies a [`RegionContext`] per frame, degrading to an empty one.
#[derive(Clone)]
pub struct RegionContextProvider {
    service: Option<Arc<dyn MapService>>,
    enabled: bool,
}

impl RegionContextProvider {
    /// `enabled = false` or a missing service always yields empty context.
    pub fn new(service: Option<Arc<dyn MapService>>, enabled: bool) -> Self {
        Self { service, enabled }
    }

    /// A provider that never queries anything.
    pub fn disabled() -> Self {
        Self::new(None, false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled && self.service.is_some()
    }

    /// Region polygons around `position`.  Failures are logged at warning
    /// level and produce an empty context.
    pub fn get_context(&self, position: Vec3, forward_distance: f64) -> RegionContext {
        let Some(service) = self.service.as_ref().filter(|_| self.enabled) else {
            return RegionContext::empty();
        };
        match service.get_region(position, forward_distance) {
            Ok(polygons) => {
                debug!(count = polygons.len(), "region context resolved");
                RegionContext { polygons }
            }
            Err(e) => {
                warn!(
                    x = position.x,
                    y = position.y,
                    z = position.z,
                    error = %e,
                    "failed to get region of interest; continuing with empty context"
                );
                RegionContext::empty()
            }
        }
    }
}
