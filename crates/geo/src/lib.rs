//! Geofencing geometry: points, distances, circular, polygon and
//! administrative fences.

#![warn(clippy::unwrap_used)]

pub mod administrative;
pub mod circular;
pub mod distance;
pub mod point;
pub mod polygon;

pub use administrative::{
    AdministrativeGeoFence, AdministrativeLevel, AdministrativeLocation, AdministrativeMode,
};
pub use circular::CircularGeoFence;
pub use distance::{haversine_distance, point_to_segment_distance, DISTANCE_TOLERANCE_METERS};
pub use point::{BoundingBox, GeoPoint, EARTH_RADIUS_METERS};
pub use polygon::{PolygonComplexity, PolygonGeoFence};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoFenceCategory {
    #[default]
    General,
    Store,
    Event,
    Competitor,
    Residential,
    Commercial,
    Poi,
    Custom,
}

/// Either fence shape, tagged by `shape` in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum GeoFence {
    Circular(CircularGeoFence),
    Polygon(PolygonGeoFence),
}

impl GeoFence {
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        match self {
            GeoFence::Circular(c) => c.contains(latitude, longitude),
            GeoFence::Polygon(p) => p.contains(latitude, longitude),
        }
    }

    pub fn is_in_core_area(&self, latitude: f64, longitude: f64) -> bool {
        match self {
            GeoFence::Circular(c) => c.is_in_core_area(latitude, longitude),
            GeoFence::Polygon(p) => p.is_in_core_area(latitude, longitude),
        }
    }

    pub fn category(&self) -> GeoFenceCategory {
        match self {
            GeoFence::Circular(c) => c.category(),
            GeoFence::Polygon(p) => p.category(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            GeoFence::Circular(c) => c.name(),
            GeoFence::Polygon(p) => p.name(),
        }
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        match self {
            GeoFence::Circular(c) => Some(c.bounding_box()),
            GeoFence::Polygon(p) => p.bounding_box(),
        }
    }
}

impl From<CircularGeoFence> for GeoFence {
    fn from(fence: CircularGeoFence) -> Self {
        GeoFence::Circular(fence)
    }
}

impl From<PolygonGeoFence> for GeoFence {
    fn from(fence: PolygonGeoFence) -> Self {
        GeoFence::Polygon(fence)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_fence_json() {
        let json = r#"{
            "shape": "circular",
            "center": {"latitude": 37.7749, "longitude": -122.4194},
            "radius_meters": 1000.0,
            "category": "store",
            "name": "flagship"
        }"#;
        let fence: GeoFence = serde_json::from_str(json).unwrap();
        assert_eq!(fence.category(), GeoFenceCategory::Store);
        assert_eq!(fence.name(), Some("flagship"));
        assert!(fence.contains(37.7749, -122.4194));

        let poly = r#"{
            "shape": "polygon",
            "vertices": [
                {"latitude": 0.0, "longitude": 0.0},
                {"latitude": 0.0, "longitude": 1.0},
                {"latitude": 1.0, "longitude": 1.0}
            ]
        }"#;
        let fence: GeoFence = serde_json::from_str(poly).unwrap();
        assert!(matches!(fence, GeoFence::Polygon(_)));

        let two_vertices = r#"{"shape": "polygon", "vertices": [
            {"latitude": 0.0, "longitude": 0.0}, {"latitude": 1.0, "longitude": 1.0}]}"#;
        assert!(serde_json::from_str::<GeoFence>(two_vertices).is_err());
    }
}
