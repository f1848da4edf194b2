//! Geographic points and bounding boxes.

use crate::distance::haversine_distance;
use serde::{Deserialize, Serialize};
use targeting_core::{TargetingError, TargetingResult};

/// Mean Earth radius used by every distance computation.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A validated latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPoint")]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawPoint {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawPoint> for GeoPoint {
    type Error = TargetingError;

    fn try_from(raw: RawPoint) -> Result<Self, Self::Error> {
        GeoPoint::new(raw.latitude, raw.longitude)
    }
}

pub fn validate_coordinates(latitude: f64, longitude: f64) -> TargetingResult<()> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(TargetingError::invalid(
            "latitude",
            format!("must be within [-90, 90], got {latitude}"),
        ));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(TargetingError::invalid(
            "longitude",
            format!("must be within [-180, 180], got {longitude}"),
        ));
    }
    Ok(())
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> TargetingResult<Self> {
        validate_coordinates(latitude, longitude)?;
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Great-circle distance in meters.
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        haversine_distance(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    /// Point reached by travelling `distance_meters` from here along the
    /// initial bearing (degrees clockwise from north).
    pub fn destination(&self, bearing_degrees: f64, distance_meters: f64) -> GeoPoint {
        let angular = distance_meters / EARTH_RADIUS_METERS;
        let bearing = bearing_degrees.to_radians();
        let lat1 = self.latitude.to_radians();
        let lon1 = self.longitude.to_radians();

        let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
        let lon2 = lon1
            + (bearing.sin() * angular.sin() * lat1.cos())
                .atan2(angular.cos() - lat1.sin() * lat2.sin());

        // Normalise longitude into [-180, 180].
        let lon2 = (lon2.to_degrees() + 540.0) % 360.0 - 180.0;
        GeoPoint {
            latitude: lat2.to_degrees().clamp(-90.0, 90.0),
            longitude: lon2,
        }
    }
}

/// Axis-aligned latitude/longitude box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl BoundingBox {
    /// Per-axis min/max over the points; `None` for an empty input.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a GeoPoint>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let init = BoundingBox {
            min_latitude: first.latitude,
            max_latitude: first.latitude,
            min_longitude: first.longitude,
            max_longitude: first.longitude,
        };
        Some(iter.fold(init, |b, p| BoundingBox {
            min_latitude: b.min_latitude.min(p.latitude),
            max_latitude: b.max_latitude.max(p.latitude),
            min_longitude: b.min_longitude.min(p.longitude),
            max_longitude: b.max_longitude.max(p.longitude),
        }))
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&latitude)
            && (self.min_longitude..=self.max_longitude).contains(&longitude)
    }

    /// Corner-to-corner great-circle distance in meters.
    pub fn diagonal_meters(&self) -> f64 {
        haversine_distance(
            self.min_latitude,
            self.min_longitude,
            self.max_latitude,
            self.max_longitude,
        )
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_latitude + self.max_latitude) / 2.0,
            (self.min_longitude + self.max_longitude) / 2.0,
        )
    }
}
