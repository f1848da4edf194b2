//! Property tests for distance and containment invariants.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use targeting_geo::{haversine_distance, CircularGeoFence, GeoPoint, PolygonGeoFence};

fn latitude() -> impl Strategy<Value = f64> {
    -70.0..70.0f64
}

fn longitude() -> impl Strategy<Value = f64> {
    -170.0..170.0f64
}

proptest! {
    #[test]
    fn haversine_is_symmetric_and_non_negative(
        lat1 in latitude(), lon1 in longitude(), lat2 in latitude(), lon2 in longitude()
    ) {
        let ab = haversine_distance(lat1, lon1, lat2, lon2);
        let ba = haversine_distance(lat2, lon2, lat1, lon1);
        prop_assert!(ab >= 0.0);
        prop_assert!((ab - ba).abs() < 1e-6);
        prop_assert_eq!(haversine_distance(lat1, lon1, lat1, lon1), 0.0);
    }

    #[test]
    fn circle_contains_its_radius_but_not_beyond_buffer(
        lat in latitude(),
        lon in longitude(),
        radius in 1.0..50_000.0f64,
        buffer_share in 0.0..1.0f64,
        bearing in 0.0..360.0f64,
    ) {
        let buffer = radius * buffer_share;
        let fence = CircularGeoFence::from_coordinates(lat, lon, radius, buffer).unwrap();
        let center = fence.center();

        let on_edge = center.destination(bearing, radius);
        prop_assert!(fence.contains_point(&on_edge));
        prop_assert!(fence.is_in_core_area(on_edge.latitude(), on_edge.longitude()));

        let outside = center.destination(bearing, radius + buffer + 1.0);
        prop_assert!(!fence.contains_point(&outside));
    }

    #[test]
    fn containment_is_monotonic_in_radius(
        lat in latitude(),
        lon in longitude(),
        radius in 1.0..20_000.0f64,
        growth in 0.0..20_000.0f64,
        bearing in 0.0..360.0f64,
        distance in 0.0..40_000.0f64,
    ) {
        let small = CircularGeoFence::from_coordinates(lat, lon, radius, 0.0).unwrap();
        let large = CircularGeoFence::from_coordinates(lat, lon, radius + growth, 0.0).unwrap();
        let point = small.center().destination(bearing, distance);
        if small.contains_point(&point) {
            prop_assert!(large.contains_point(&point));
        }
    }

    #[test]
    fn rectangle_contains_centroid(
        lat in -60.0..60.0f64,
        lon in -160.0..160.0f64,
        height in 0.001..5.0f64,
        width in 0.001..5.0f64,
    ) {
        let poly = PolygonGeoFence::from_coordinates(
            &[(lat, lon), (lat, lon + width), (lat + height, lon + width), (lat + height, lon)],
            0.0,
        )
        .unwrap();
        let centroid = poly.centroid();
        prop_assert!(poly.contains_point(&centroid));
        prop_assert!(!poly.contains(lat + height * 2.0 + 1.0, lon));
    }

    #[test]
    fn simplify_keeps_a_valid_ring(
        coords in prop::collection::vec((latitude(), longitude()), 3..40),
        tolerance in 0.0..100_000.0f64,
    ) {
        let poly = PolygonGeoFence::from_coordinates(&coords, 0.0).unwrap();
        let simplified = poly.simplify(tolerance).unwrap();
        prop_assert!(simplified.vertex_count() >= 3);
        prop_assert!(simplified.vertex_count() <= poly.vertex_count());
        prop_assert_eq!(simplified.vertices()[0], poly.vertices()[0]);
    }
}

#[test]
fn point_construction_matches_validation() {
    assert!(GeoPoint::new(90.0, 180.0).is_ok());
    assert!(GeoPoint::new(90.000_001, 0.0).is_err());
}
