//! Criteria configured from JSON and evaluated against a context.

#![allow(clippy::unwrap_used)]

use targeting_core::facts::{DeviceInfo, DeviceType, GeoInfo, UserInfo};
use targeting_core::TargetingContext;
use targeting_criteria::{CriteriaType, TargetingCriteria};

fn request_context() -> TargetingContext {
    let mut ctx = TargetingContext::with_id("request", "req-42").unwrap();
    ctx.set_fact(&GeoInfo {
        country_code: Some("US".into()),
        city_name: Some("San Francisco".into()),
        latitude: Some(37.7749),
        longitude: Some(-122.4194),
        ..Default::default()
    })
    .unwrap();
    ctx.set_fact(&DeviceInfo {
        device_type: Some(DeviceType::Mobile),
        os: Some("Android".into()),
        ..Default::default()
    })
    .unwrap();
    ctx.set_fact(&UserInfo {
        age: Some(29),
        ..Default::default()
    })
    .unwrap();
    ctx
}

#[test]
fn criteria_list_from_json() {
    let json = r#"[
        {
            "kind": "administrative_geo",
            "criteria_name": "us-only",
            "criteria_type": "geo",
            "weight": 2.0,
            "rules": [
                {"name": "included_locations", "value": "[{\"country_code\":\"US\"}]", "value_type": "json"},
                {"name": "mode", "value": "\"include\"", "value_type": "json"}
            ]
        },
        {
            "kind": "device",
            "criteria_name": "mobile",
            "criteria_type": "device",
            "rules": [
                {"name": "device_types", "value": "[\"mobile\"]", "value_type": "json"}
            ]
        },
        {
            "kind": "demographic",
            "criteria_name": "over-40",
            "criteria_type": "demographic",
            "rules": [
                {"name": "min_age", "value": "40", "value_type": "integer"}
            ]
        }
    ]"#;
    let criteria: Vec<TargetingCriteria> = serde_json::from_str(json).unwrap();
    assert_eq!(criteria.len(), 3);
    assert_eq!(criteria[0].criteria_type(), CriteriaType::Geo);
    assert_eq!(criteria[0].weight(), 2.0);
    for c in &criteria {
        assert!(c.validate().is_valid(), "{}", c.validate().summary);
    }

    let ctx = request_context();
    let outcomes: Vec<bool> = criteria.iter().map(|c| c.evaluate(&ctx).matched).collect();
    assert_eq!(outcomes, vec![true, true, false]);
}

#[test]
fn evaluation_does_not_touch_context() {
    let ctx = request_context();
    let before = ctx.clone();
    let json = r#"{"kind": "tag", "criteria_name": "vip", "criteria_type": "tag",
        "rules": [{"name": "required_tags", "value": "[\"vip\"]", "value_type": "json"}]}"#;
    let criteria: TargetingCriteria = serde_json::from_str(json).unwrap();
    assert!(!criteria.evaluate(&ctx).matched);
    assert_eq!(ctx, before);
}
