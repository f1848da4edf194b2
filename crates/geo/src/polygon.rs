//! Polygon geofence: ray-casting containment, buffered edges, spherical
//! area and a single-pass simplifier.
//!
//! The vertex ring is implicitly closed; the last vertex connects back to the
//! first. Complexity and the self-intersection flag are recomputed after
//! every vertex mutation.

use crate::distance::{haversine_distance, point_to_segment_distance, DISTANCE_TOLERANCE_METERS};
use crate::point::{BoundingBox, GeoPoint, EARTH_RADIUS_METERS};
use crate::GeoFenceCategory;
use serde::{Deserialize, Serialize};
use targeting_core::{TargetingError, TargetingResult};

pub const MIN_VERTICES: usize = 3;
pub const MAX_VERTICES: usize = 1000;
pub const MAX_POLYGON_BUFFER_METERS: f64 = 10_000.0;

/// Perimeter-to-diagonal ratio above which a polygon is flagged as
/// likely self-intersecting. A heuristic, not a proof.
pub const SELF_INTERSECTION_RATIO: f64 = 10.0;

/// Vertex-count class used to pick rendering and caching strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolygonComplexity {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl PolygonComplexity {
    pub fn classify(vertex_count: usize) -> Self {
        match vertex_count {
            0..=10 => Self::Low,
            11..=50 => Self::Medium,
            51..=200 => Self::High,
            _ => Self::VeryHigh,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PolygonFenceRecord")]
pub struct PolygonGeoFence {
    vertices: Vec<GeoPoint>,
    buffer_meters: f64,
    category: GeoFenceCategory,
    name: Option<String>,
    complexity: PolygonComplexity,
    likely_self_intersecting: bool,
}

#[derive(Deserialize)]
struct PolygonFenceRecord {
    vertices: Vec<GeoPoint>,
    #[serde(default)]
    buffer_meters: f64,
    #[serde(default)]
    category: GeoFenceCategory,
    #[serde(default)]
    name: Option<String>,
}

impl TryFrom<PolygonFenceRecord> for PolygonGeoFence {
    type Error = TargetingError;

    fn try_from(record: PolygonFenceRecord) -> Result<Self, Self::Error> {
        let mut fence = PolygonGeoFence::new(record.vertices, record.buffer_meters)?
            .with_category(record.category);
        fence.name = record.name;
        Ok(fence)
    }
}

fn validate_vertex_count(count: usize) -> TargetingResult<()> {
    if !(MIN_VERTICES..=MAX_VERTICES).contains(&count) {
        return Err(TargetingError::invalid(
            "vertices",
            format!("polygon needs between {MIN_VERTICES} and {MAX_VERTICES} vertices, got {count}"),
        ));
    }
    Ok(())
}

fn validate_buffer(buffer_meters: f64) -> TargetingResult<()> {
    if !buffer_meters.is_finite() || !(0.0..=MAX_POLYGON_BUFFER_METERS).contains(&buffer_meters) {
        return Err(TargetingError::invalid(
            "buffer_meters",
            format!("must be within [0, {MAX_POLYGON_BUFFER_METERS}], got {buffer_meters}"),
        ));
    }
    Ok(())
}

impl PolygonGeoFence {
    pub fn new(vertices: Vec<GeoPoint>, buffer_meters: f64) -> TargetingResult<Self> {
        validate_vertex_count(vertices.len())?;
        validate_buffer(buffer_meters)?;
        let mut fence = Self {
            vertices,
            buffer_meters,
            category: GeoFenceCategory::General,
            name: None,
            complexity: PolygonComplexity::Low,
            likely_self_intersecting: false,
        };
        fence.recompute();
        Ok(fence)
    }

    /// Build from `(latitude, longitude)` pairs, validating each vertex.
    pub fn from_coordinates(coordinates: &[(f64, f64)], buffer_meters: f64) -> TargetingResult<Self> {
        let vertices = coordinates
            .iter()
            .map(|&(lat, lon)| GeoPoint::new(lat, lon))
            .collect::<TargetingResult<Vec<_>>>()?;
        Self::new(vertices, buffer_meters)
    }

    pub fn with_category(mut self, category: GeoFenceCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn vertices(&self) -> &[GeoPoint] {
        &self.vertices
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
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

    pub fn complexity(&self) -> PolygonComplexity {
        self.complexity
    }

    pub fn is_likely_self_intersecting(&self) -> bool {
        self.likely_self_intersecting
    }

    pub fn set_buffer(&mut self, buffer_meters: f64) -> TargetingResult<()> {
        validate_buffer(buffer_meters)?;
        self.buffer_meters = buffer_meters;
        Ok(())
    }

    pub fn set_vertices(&mut self, vertices: Vec<GeoPoint>) -> TargetingResult<()> {
        validate_vertex_count(vertices.len())?;
        self.vertices = vertices;
        self.recompute();
        Ok(())
    }

    pub fn add_vertex(&mut self, vertex: GeoPoint) -> TargetingResult<()> {
        validate_vertex_count(self.vertices.len() + 1)?;
        self.vertices.push(vertex);
        self.recompute();
        Ok(())
    }

    pub fn insert_vertex(&mut self, index: usize, vertex: GeoPoint) -> TargetingResult<()> {
        if index > self.vertices.len() {
            return Err(TargetingError::invalid(
                "index",
                format!("insert position {index} exceeds vertex count {}", self.vertices.len()),
            ));
        }
        validate_vertex_count(self.vertices.len() + 1)?;
        self.vertices.insert(index, vertex);
        self.recompute();
        Ok(())
    }

    /// Remove a vertex. The polygon is left unchanged if it would drop
    /// below the minimum vertex count.
    pub fn remove_vertex(&mut self, index: usize) -> TargetingResult<GeoPoint> {
        if self.vertices.len() <= MIN_VERTICES {
            return Err(TargetingError::invalid(
                "vertices",
                format!("polygon must keep at least {MIN_VERTICES} vertices"),
            ));
        }
        if index >= self.vertices.len() {
            return Err(TargetingError::invalid(
                "index",
                format!("vertex {index} out of range for {} vertices", self.vertices.len()),
            ));
        }
        let removed = self.vertices.remove(index);
        self.recompute();
        Ok(removed)
    }

    fn recompute(&mut self) {
        self.complexity = PolygonComplexity::classify(self.vertices.len());
        self.likely_self_intersecting = match self.bounding_box() {
            Some(bbox) => {
                let diagonal = bbox.diagonal_meters();
                diagonal == 0.0 || self.perimeter_meters() > SELF_INTERSECTION_RATIO * diagonal
            }
            None => false,
        };
    }

    fn edges(&self) -> impl Iterator<Item = (&GeoPoint, &GeoPoint)> {
        let n = self.vertices.len();
        (0..n).map(move |i| (&self.vertices[i], &self.vertices[(i + 1) % n]))
    }

    /// Inside the vertex ring, no buffer. The edges themselves belong to the
    /// core area even where the crossing-number test leaves them out.
    pub fn is_in_core_area(&self, latitude: f64, longitude: f64) -> bool {
        self.crosses_odd(latitude, longitude)
            || self.distance_to_boundary(latitude, longitude) <= DISTANCE_TOLERANCE_METERS
    }

    /// Crossing-number test against the vertex ring.
    fn crosses_odd(&self, latitude: f64, longitude: f64) -> bool {
        let mut inside = false;
        for (a, b) in self.edges() {
            let (ay, ax) = (a.latitude(), a.longitude());
            let (by, bx) = (b.latitude(), b.longitude());
            if (ay > latitude) != (by > latitude) {
                let crossing_lon = (bx - ax) * (latitude - ay) / (by - ay) + ax;
                if longitude < crossing_lon {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// Minimum distance from the point to any edge, in meters.
    pub fn distance_to_boundary(&self, latitude: f64, longitude: f64) -> f64 {
        self.edges()
            .map(|(a, b)| point_to_segment_distance(latitude, longitude, a, b))
            .fold(f64::INFINITY, f64::min)
    }

    /// Outside the ring but within `buffer_meters` of an edge.
    pub fn is_in_buffer_zone(&self, latitude: f64, longitude: f64) -> bool {
        self.buffer_meters > 0.0
            && !self.is_in_core_area(latitude, longitude)
            && self.distance_to_boundary(latitude, longitude)
                <= self.buffer_meters + DISTANCE_TOLERANCE_METERS
    }

    /// Inside the ring, or within the buffer of an edge. Edge distance is
    /// measured whenever ray casting says outside, whatever the buffer.
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        self.crosses_odd(latitude, longitude)
            || self.distance_to_boundary(latitude, longitude)
                <= self.buffer_meters + DISTANCE_TOLERANCE_METERS
    }

    pub fn contains_point(&self, point: &GeoPoint) -> bool {
        self.contains(point.latitude(), point.longitude())
    }

    /// Spherical shoelace approximation, square meters.
    pub fn area_square_meters(&self) -> f64 {
        let total: f64 = self
            .edges()
            .map(|(a, b)| {
                (b.longitude() - a.longitude()).to_radians()
                    * (2.0 + a.latitude().to_radians().sin() + b.latitude().to_radians().sin())
            })
            .sum();
        (total * EARTH_RADIUS_METERS * EARTH_RADIUS_METERS / 2.0).abs()
    }

    pub fn perimeter_meters(&self) -> f64 {
        self.edges()
            .map(|(a, b)| haversine_distance(a.latitude(), a.longitude(), b.latitude(), b.longitude()))
            .sum()
    }

    /// Arithmetic mean of the vertices.
    pub fn centroid(&self) -> GeoPoint {
        let n = self.vertices.len() as f64;
        let (lat_sum, lon_sum) = self
            .vertices
            .iter()
            .fold((0.0, 0.0), |(la, lo), p| (la + p.latitude(), lo + p.longitude()));
        // Means of valid coordinates are themselves valid.
        GeoPoint::new(lat_sum / n, lon_sum / n).unwrap_or(self.vertices[0])
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(&self.vertices)
    }

    /// Drop every vertex whose distance to the segment joining its
    /// neighbours is below `tolerance_meters`. First and last vertices are
    /// always kept. If fewer than three vertices would survive, the
    /// polygon is returned unchanged.
    pub fn simplify(&self, tolerance_meters: f64) -> TargetingResult<PolygonGeoFence> {
        if !tolerance_meters.is_finite() || tolerance_meters < 0.0 {
            return Err(TargetingError::invalid(
                "tolerance_meters",
                format!("must be a non-negative number, got {tolerance_meters}"),
            ));
        }
        let n = self.vertices.len();
        let mut kept = Vec::with_capacity(n);
        kept.push(self.vertices[0]);
        for i in 1..n - 1 {
            let (prev, current, next) = (&self.vertices[i - 1], &self.vertices[i], &self.vertices[i + 1]);
            let deviation =
                point_to_segment_distance(current.latitude(), current.longitude(), prev, next);
            if deviation >= tolerance_meters {
                kept.push(*current);
            }
        }
        kept.push(self.vertices[n - 1]);

        if kept.len() < MIN_VERTICES {
            return Ok(self.clone());
        }
        let mut simplified = PolygonGeoFence::new(kept, self.buffer_meters)?.with_category(self.category);
        simplified.name = self.name.clone();
        Ok(simplified)
    }
}
