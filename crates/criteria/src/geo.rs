//! Geo criteria: coordinate fences and administrative boundaries.

use serde::{Deserialize, Serialize};
use targeting_core::facts::GeoInfo;
use targeting_core::{Criteria, CriteriaBase, Json, TargetingContext, TargetingResult, ValidationResult};
use targeting_geo::{
    AdministrativeGeoFence, AdministrativeLevel, AdministrativeLocation, AdministrativeMode, GeoFence,
};

use crate::evaluation::{ContextPredicate, Evaluation};
use crate::{check_decodable, CriteriaType};

const FENCES: &str = "fences";
const TARGET_INSIDE: &str = "target_inside";
const CORE_AREA_ONLY: &str = "core_area_only";
const BUFFER_SCORE: &str = "buffer_score";

const INCLUDED_LOCATIONS: &str = "included_locations";
const EXCLUDED_LOCATIONS: &str = "excluded_locations";
const MODE: &str = "mode";
const LEVEL_PRIORITY: &str = "level_priority";

/// Fence lists larger than this are accepted but flagged.
const MAX_RECOMMENDED_FENCES: usize = 100;

/// Targets requests whose coordinates fall inside (or outside) a set of fences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CriteriaBase", into = "CriteriaBase")]
pub struct GeoLocationTargeting {
    base: CriteriaBase,
}

rule_backed_criteria!(GeoLocationTargeting, CriteriaType::Geo);

impl GeoLocationTargeting {
    /// Fences decode through their validating constructors; an
    /// unreadable rule yields an empty list.
    pub fn fences(&self) -> Vec<GeoFence> {
        self.base.get_rule_value_or(FENCES, Vec::new())
    }

    pub fn set_fences(&mut self, fences: &[GeoFence]) -> TargetingResult<()> {
        self.base.set_rule(FENCES, &fences.to_vec())
    }

    pub fn add_fence(&mut self, fence: impl Into<GeoFence>) -> TargetingResult<()> {
        let mut fences = self.fences();
        fences.push(fence.into());
        self.set_fences(&fences)
    }

    /// Match inside any fence (default) or outside all of them.
    pub fn target_inside(&self) -> bool {
        self.base.get_rule_value_or(TARGET_INSIDE, true)
    }

    pub fn set_target_inside(&mut self, inside: bool) -> TargetingResult<()> {
        self.base.set_rule(TARGET_INSIDE, &inside)
    }

    /// Ignore buffers when deciding containment.
    pub fn core_area_only(&self) -> bool {
        self.base.get_rule_value_or(CORE_AREA_ONLY, false)
    }

    pub fn set_core_area_only(&mut self, core_only: bool) -> TargetingResult<()> {
        self.base.set_rule(CORE_AREA_ONLY, &core_only)
    }

    /// Score given to a point that is only inside a buffer ring.
    pub fn buffer_score(&self) -> f64 {
        self.base.get_rule_value_or(BUFFER_SCORE, 0.5)
    }

    pub fn set_buffer_score(&mut self, score: f64) -> TargetingResult<()> {
        if !(0.0..=1.0).contains(&score) {
            return Err(targeting_core::TargetingError::invalid(
                BUFFER_SCORE,
                format!("must be within [0, 1], got {score}"),
            ));
        }
        self.base.set_rule(BUFFER_SCORE, &score)
    }

    /// Best containment over all fences: 1.0 in a core area, the buffer
    /// score in a buffer ring, 0.0 outside.
    fn containment(&self, fences: &[GeoFence], latitude: f64, longitude: f64) -> f64 {
        let core_only = self.core_area_only();
        let buffer_score = self.buffer_score();
        fences
            .iter()
            .map(|fence| {
                if fence.is_in_core_area(latitude, longitude) {
                    1.0
                } else if !core_only && fence.contains(latitude, longitude) {
                    buffer_score
                } else {
                    0.0
                }
            })
            .fold(0.0, f64::max)
    }
}

impl Criteria for GeoLocationTargeting {
    fn base(&self) -> &CriteriaBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CriteriaBase {
        &mut self.base
    }

    fn validate_specific_rules(&self, result: &mut ValidationResult) {
        match self.base.get_rule(FENCES) {
            None => result.add_error("no_fences", "at least one geofence is required", Some(FENCES), None),
            Some(rule) => match rule.value::<Vec<GeoFence>>() {
                None => result.add_error(
                    "fences_invalid",
                    "geofence list could not be decoded or contains an invalid fence",
                    Some(FENCES),
                    Some(rule.value.clone()),
                ),
                Some(fences) if fences.is_empty() => {
                    result.add_error("no_fences", "at least one geofence is required", Some(FENCES), None)
                }
                Some(fences) if fences.len() > MAX_RECOMMENDED_FENCES => result.add_warning(
                    "many_fences",
                    format!("{} fences configured; consider splitting the criteria", fences.len()),
                    Some(FENCES),
                ),
                Some(_) => {}
            },
        }
        check_decodable::<bool>(&self.base, TARGET_INSIDE, result);
        check_decodable::<bool>(&self.base, CORE_AREA_ONLY, result);
        check_decodable::<f64>(&self.base, BUFFER_SCORE, result);
    }
}

impl ContextPredicate for GeoLocationTargeting {
    fn evaluate(&self, context: &TargetingContext) -> Evaluation {
        let Some((latitude, longitude)) = context.fact::<GeoInfo>().and_then(|g| g.coordinates()) else {
            return Evaluation::missing_fact("coordinates");
        };
        let fences = self.fences();
        let containment = self.containment(&fences, latitude, longitude);
        let mut evaluation = Evaluation::new();
        if self.target_inside() {
            evaluation.record("inside_fence", containment > 0.0);
            evaluation.finish().with_score(containment)
        } else {
            evaluation.record("outside_fences", containment == 0.0);
            evaluation.finish()
        }
    }
}

/// Targets requests by country, province or city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CriteriaBase", into = "CriteriaBase")]
pub struct AdministrativeGeoTargeting {
    base: CriteriaBase,
}

rule_backed_criteria!(AdministrativeGeoTargeting, CriteriaType::Geo);

impl AdministrativeGeoTargeting {
    pub fn included_locations(&self) -> Vec<AdministrativeLocation> {
        self.base.get_rule_value_or(INCLUDED_LOCATIONS, Vec::new())
    }

    pub fn set_included_locations(&mut self, locations: &[AdministrativeLocation]) -> TargetingResult<()> {
        self.base.set_rule(INCLUDED_LOCATIONS, &locations.to_vec())
    }

    pub fn excluded_locations(&self) -> Vec<AdministrativeLocation> {
        self.base.get_rule_value_or(EXCLUDED_LOCATIONS, Vec::new())
    }

    pub fn set_excluded_locations(&mut self, locations: &[AdministrativeLocation]) -> TargetingResult<()> {
        self.base.set_rule(EXCLUDED_LOCATIONS, &locations.to_vec())
    }

    pub fn mode(&self) -> AdministrativeMode {
        self.base
            .get_rule_value::<Json<AdministrativeMode>>(MODE)
            .map(|m| m.0)
            .unwrap_or_default()
    }

    pub fn set_mode(&mut self, mode: AdministrativeMode) -> TargetingResult<()> {
        self.base.set_rule(MODE, &Json(mode))
    }

    pub fn level_priority(&self) -> Option<AdministrativeLevel> {
        self.base
            .get_rule_value::<Json<AdministrativeLevel>>(LEVEL_PRIORITY)
            .map(|l| l.0)
    }

    pub fn set_level_priority(&mut self, level: Option<AdministrativeLevel>) -> TargetingResult<()> {
        match level {
            Some(level) => self.base.set_rule(LEVEL_PRIORITY, &Json(level)),
            None => {
                self.base.remove_rule(LEVEL_PRIORITY);
                Ok(())
            }
        }
    }

    /// The fence described by the current rules.
    pub fn fence(&self) -> AdministrativeGeoFence {
        AdministrativeGeoFence {
            included_locations: self.included_locations(),
            excluded_locations: self.excluded_locations(),
            mode: self.mode(),
            level_priority: self.level_priority(),
        }
    }

    pub fn is_location_matched(&self, geo: &GeoInfo) -> bool {
        self.fence().is_location_matched(geo)
    }
}

impl Criteria for AdministrativeGeoTargeting {
    fn base(&self) -> &CriteriaBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CriteriaBase {
        &mut self.base
    }

    fn validate_specific_rules(&self, result: &mut ValidationResult) {
        check_decodable::<Vec<AdministrativeLocation>>(&self.base, INCLUDED_LOCATIONS, result);
        check_decodable::<Vec<AdministrativeLocation>>(&self.base, EXCLUDED_LOCATIONS, result);
        check_decodable::<Json<AdministrativeMode>>(&self.base, MODE, result);
        check_decodable::<Json<AdministrativeLevel>>(&self.base, LEVEL_PRIORITY, result);
        if let Err(err) = self.fence().validate() {
            result.add_error("locations_invalid", err.to_string(), err.field(), None);
        }
    }
}

impl ContextPredicate for AdministrativeGeoTargeting {
    fn evaluate(&self, context: &TargetingContext) -> Evaluation {
        let Some(geo) = context.fact::<GeoInfo>() else {
            return Evaluation::missing_fact("location");
        };
        let fence = self.fence();
        let mut evaluation = Evaluation::new();
        let dimension = match fence.matched_location(&geo).and_then(AdministrativeLocation::level) {
            Some(AdministrativeLevel::Country) => "country",
            Some(AdministrativeLevel::Province) => "province",
            Some(AdministrativeLevel::City) => "city",
            None => "location",
        };
        evaluation.record(dimension, fence.is_location_matched(&geo));
        evaluation.finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use targeting_geo::CircularGeoFence;

    fn context_at(latitude: f64, longitude: f64) -> TargetingContext {
        let mut ctx = TargetingContext::new("request").unwrap();
        ctx.set_fact(&GeoInfo {
            country_code: Some("US".into()),
            city_name: Some("San Francisco".into()),
            latitude: Some(latitude),
            longitude: Some(longitude),
            ..Default::default()
        })
        .unwrap();
        ctx
    }

    fn store_fence() -> GeoLocationTargeting {
        let mut criteria = GeoLocationTargeting::new("near-store").unwrap();
        criteria
            .add_fence(CircularGeoFence::from_coordinates(37.7749, -122.4194, 1_000.0, 500.0).unwrap())
            .unwrap();
        criteria
    }

    #[test]
    fn test_geo_fence_scores() {
        let criteria = store_fence();
        let center = criteria.fences()[0].clone();
        assert!(center.contains(37.7749, -122.4194));

        let inside = criteria.evaluate(&context_at(37.7749, -122.4194));
        assert!(inside.matched);
        assert_eq!(inside.score, 1.0);

        // About 1.2 km north: buffer ring only.
        let ring = criteria.evaluate(&context_at(37.7857, -122.4194));
        assert!(ring.matched);
        assert_eq!(ring.score, 0.5);

        let far = criteria.evaluate(&context_at(34.0522, -118.2437));
        assert!(!far.matched);
        assert_eq!(far.score, 0.0);
    }

    #[test]
    fn test_geo_fence_outside_mode_and_missing_coordinates() {
        let mut criteria = store_fence();
        criteria.set_target_inside(false).unwrap();
        assert!(criteria.matches(&context_at(34.0522, -118.2437)));
        assert!(!criteria.matches(&context_at(37.7749, -122.4194)));

        let bare = TargetingContext::new("request").unwrap();
        let e = criteria.evaluate(&bare);
        assert!(!e.matched);
        assert_eq!(e.missed_dimensions, vec!["coordinates".to_string()]);
    }

    #[test]
    fn test_geo_fence_validation() {
        let empty = GeoLocationTargeting::new("nothing").unwrap();
        assert!(empty.validate().has_error("no_fences"));
        assert!(store_fence().validate().is_valid());

        let mut broken = GeoLocationTargeting::new("broken").unwrap();
        broken.base_mut().set_rule(FENCES, &"not json".to_string()).unwrap();
        assert!(broken.validate().has_error("fences_invalid"));
    }

    #[test]
    fn test_administrative_include_then_exclude() {
        let mut criteria = AdministrativeGeoTargeting::new("us-only").unwrap();
        criteria
            .set_included_locations(&[AdministrativeLocation::country("US")])
            .unwrap();
        criteria.set_mode(AdministrativeMode::Include).unwrap();

        let geo = GeoInfo {
            country_code: Some("US".into()),
            city_name: Some("San Francisco".into()),
            ..Default::default()
        };
        assert!(criteria.is_location_matched(&geo));
        let e = criteria.evaluate(&context_at(37.7749, -122.4194));
        assert_eq!(e.matched_dimensions, vec!["country".to_string()]);

        criteria.set_mode(AdministrativeMode::Exclude).unwrap();
        assert!(!criteria.is_location_matched(&geo));
        let canada = GeoInfo {
            country_code: Some("CA".into()),
            ..Default::default()
        };
        assert!(criteria.is_location_matched(&canada));
    }

    #[test]
    fn test_administrative_validation() {
        let criteria = AdministrativeGeoTargeting::new("empty").unwrap();
        let result = criteria.validate();
        assert!(result.has_error("locations_invalid"));
        assert!(result.summary.starts_with("geo criteria 'empty'"));
    }
}
