//! Circular geofence with an optional outward buffer ring.

use crate::distance::DISTANCE_TOLERANCE_METERS;
use crate::point::{BoundingBox, GeoPoint};
use crate::GeoFenceCategory;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use targeting_core::{TargetingError, TargetingResult};

pub const MIN_RADIUS_METERS: f64 = 1.0;
pub const MAX_RADIUS_METERS: f64 = 100_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CircularFenceRecord")]
pub struct CircularGeoFence {
    center: GeoPoint,
    radius_meters: f64,
    buffer_meters: f64,
    category: GeoFenceCategory,
    name: Option<String>,
}

#[derive(Deserialize)]
struct CircularFenceRecord {
    center: GeoPoint,
    radius_meters: f64,
    #[serde(default)]
    buffer_meters: f64,
    #[serde(default)]
    category: GeoFenceCategory,
    #[serde(default)]
    name: Option<String>,
}

impl TryFrom<CircularFenceRecord> for CircularGeoFence {
    type Error = TargetingError;

    fn try_from(record: CircularFenceRecord) -> Result<Self, Self::Error> {
        let mut fence = CircularGeoFence::new(record.center, record.radius_meters, record.buffer_meters)?
            .with_category(record.category);
        fence.name = record.name;
        Ok(fence)
    }
}

fn validate_dimensions(radius_meters: f64, buffer_meters: f64) -> TargetingResult<()> {
    if !radius_meters.is_finite() || !(MIN_RADIUS_METERS..=MAX_RADIUS_METERS).contains(&radius_meters) {
        return Err(TargetingError::invalid(
            "radius_meters",
            format!("must be within [{MIN_RADIUS_METERS}, {MAX_RADIUS_METERS}], got {radius_meters}"),
        ));
    }
    if !buffer_meters.is_finite() || buffer_meters < 0.0 || buffer_meters > radius_meters {
        return Err(TargetingError::invalid(
            "buffer_meters",
            format!("must be within [0, radius ({radius_meters})], got {buffer_meters}"),
        ));
    }
    Ok(())
}

impl CircularGeoFence {
    pub fn new(center: GeoPoint, radius_meters: f64, buffer_meters: f64) -> TargetingResult<Self> {
        validate_dimensions(radius_meters, buffer_meters)?;
        Ok(Self {
            center,
            radius_meters,
            buffer_meters,
            category: GeoFenceCategory::General,
            name: None,
        })
    }

    /// Build from raw coordinates, validating both the center and the dimensions.
    pub fn from_coordinates(
        latitude: f64,
        longitude: f64,
        radius_meters: f64,
        buffer_meters: f64,
    ) -> TargetingResult<Self> {
        Self::new(GeoPoint::new(latitude, longitude)?, radius_meters, buffer_meters)
    }

    pub fn with_category(mut self, category: GeoFenceCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn center(&self) -> GeoPoint {
        self.center
    }

    pub fn radius_meters(&self) -> f64 {
        self.radius_meters
    }

    pub fn buffer_meters(&self) -> f64 {
        self.buffer_meters
    }

    pub fn category(&self) -> GeoFenceCategory {
        self.category
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn effective_radius(&self) -> f64 {
        self.radius_meters + self.buffer_meters
    }

    pub fn set_center(&mut self, center: GeoPoint) {
        self.center = center;
    }

    pub fn set_radius(&mut self, radius_meters: f64) -> TargetingResult<()> {
        validate_dimensions(radius_meters, self.buffer_meters)?;
        self.radius_meters = radius_meters;
        Ok(())
    }

    pub fn set_buffer(&mut self, buffer_meters: f64) -> TargetingResult<()> {
        validate_dimensions(self.radius_meters, buffer_meters)?;
        self.buffer_meters = buffer_meters;
        Ok(())
    }

    /// Update center and radius together; nothing changes if either is invalid.
    pub fn update(&mut self, latitude: f64, longitude: f64, radius_meters: f64) -> TargetingResult<()> {
        let center = GeoPoint::new(latitude, longitude)?;
        validate_dimensions(radius_meters, self.buffer_meters)?;
        self.center = center;
        self.radius_meters = radius_meters;
        Ok(())
    }

    pub fn distance_from_center(&self, latitude: f64, longitude: f64) -> f64 {
        crate::distance::haversine_distance(
            self.center.latitude(),
            self.center.longitude(),
            latitude,
            longitude,
        )
    }

    /// Signed distance to the core boundary: negative inside, positive outside.
    pub fn distance_to_boundary(&self, latitude: f64, longitude: f64) -> f64 {
        self.distance_from_center(latitude, longitude) - self.radius_meters
    }

    /// Inside the radius or the buffer ring.
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        self.distance_from_center(latitude, longitude)
            <= self.effective_radius() + DISTANCE_TOLERANCE_METERS
    }

    pub fn contains_point(&self, point: &GeoPoint) -> bool {
        self.contains(point.latitude(), point.longitude())
    }

    pub fn is_in_core_area(&self, latitude: f64, longitude: f64) -> bool {
        self.distance_from_center(latitude, longitude)
            <= self.radius_meters + DISTANCE_TOLERANCE_METERS
    }

    /// Distance in `(radius, radius + buffer]`.
    pub fn is_in_buffer_zone(&self, latitude: f64, longitude: f64) -> bool {
        self.buffer_meters > 0.0
            && !self.is_in_core_area(latitude, longitude)
            && self.contains(latitude, longitude)
    }

    /// Whether the buffered circles intersect.
    pub fn overlaps_with(&self, other: &CircularGeoFence) -> bool {
        self.center.distance_to(&other.center) < self.effective_radius() + other.effective_radius()
    }

    /// Area of the buffered circle in square meters.
    pub fn area_square_meters(&self) -> f64 {
        PI * self.effective_radius().powi(2)
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let r = self.effective_radius();
        let north = self.center.destination(0.0, r);
        let south = self.center.destination(180.0, r);
        let east = self.center.destination(90.0, r);
        let west = self.center.destination(270.0, r);
        BoundingBox {
            min_latitude: south.latitude(),
            max_latitude: north.latitude(),
            min_longitude: west.longitude(),
            max_longitude: east.longitude(),
        }
    }
}
