//! Great-circle and point-to-segment distances in meters.
//!
//! Segment distances project onto a local equirectangular plane centred on
//! the query point, which is accurate for fence-sized segments. Segments
//! crossing the antimeridian are not handled.

use crate::point::{GeoPoint, EARTH_RADIUS_METERS};

/// Tolerance applied to boundary comparisons so a point computed to lie
/// exactly on a boundary is not rejected by rounding.
pub const DISTANCE_TOLERANCE_METERS: f64 = 1e-3;

/// Haversine distance between two coordinates, in meters.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();
    EARTH_RADIUS_METERS * c
}

/// Minimum distance from a coordinate to the segment `a`–`b`, in meters.
///
/// The projection parameter is clamped to [0, 1] so points beyond either
/// end measure to the nearest endpoint.
pub fn point_to_segment_distance(latitude: f64, longitude: f64, a: &GeoPoint, b: &GeoPoint) -> f64 {
    let meters_per_degree = EARTH_RADIUS_METERS * std::f64::consts::PI / 180.0;
    let lon_scale = latitude.to_radians().cos() * meters_per_degree;

    // Query point at the origin.
    let ax = (a.longitude() - longitude) * lon_scale;
    let ay = (a.latitude() - latitude) * meters_per_degree;
    let bx = (b.longitude() - longitude) * lon_scale;
    let by = (b.latitude() - latitude) * meters_per_degree;

    let dx = bx - ax;
    let dy = by - ay;
    let length_sq = dx * dx + dy * dy;
    if length_sq == 0.0 {
        return haversine_distance(latitude, longitude, a.latitude(), a.longitude());
    }

    let t = (-(ax * dx + ay * dy) / length_sq).clamp(0.0, 1.0);
    let closest_lat = a.latitude() + t * (b.latitude() - a.latitude());
    let closest_lon = a.longitude() + t * (b.longitude() - a.longitude());
    haversine_distance(latitude, longitude, closest_lat, closest_lon)
}
