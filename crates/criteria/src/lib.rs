//! Concrete targeting criteria built on the shared rule store.
//!
//! Every type embeds a [`CriteriaBase`], exposes typed accessors over named
//! rules and adds its own validation and context predicate.

#![warn(clippy::unwrap_used)]

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use targeting_core::{Criteria, CriteriaBase, TargetingContext, ValidationResult};
use tracing::trace;

/// Implements construction and the serde bridge to `CriteriaBase` for a
/// rule-backed criteria struct with a single `base` field.
macro_rules! rule_backed_criteria {
    ($ty:ident, $kind:expr) => {
        impl $ty {
            pub const CRITERIA_TYPE: $crate::CriteriaType = $kind;

            pub fn new(name: impl Into<String>) -> targeting_core::TargetingResult<Self> {
                Ok(Self {
                    base: targeting_core::CriteriaBase::new(name, $kind.as_str())?,
                })
            }
        }

        impl TryFrom<targeting_core::CriteriaBase> for $ty {
            type Error = targeting_core::TargetingError;

            fn try_from(base: targeting_core::CriteriaBase) -> Result<Self, Self::Error> {
                if base.criteria_type() != $kind.as_str() {
                    return Err(targeting_core::TargetingError::invalid(
                        "criteria_type",
                        format!("expected '{}', got '{}'", $kind.as_str(), base.criteria_type()),
                    ));
                }
                Ok(Self { base })
            }
        }

        impl From<$ty> for targeting_core::CriteriaBase {
            fn from(criteria: $ty) -> Self {
                criteria.base
            }
        }
    };
}

pub mod behavior;
pub mod demographic;
pub mod device;
pub mod evaluation;
pub mod geo;
pub mod interest;
pub mod preference;
pub mod tag;
pub mod time;
pub mod value;

pub use behavior::BehaviorTargeting;
pub use demographic::DemographicTargeting;
pub use device::DeviceTargeting;
pub use evaluation::{ContextPredicate, Evaluation};
pub use geo::{AdministrativeGeoTargeting, GeoLocationTargeting};
pub use interest::InterestTargeting;
pub use preference::PreferenceTargeting;
pub use tag::TagTargeting;
pub use time::TimeTargeting;
pub use value::ValueTargeting;

/// Criteria type identifiers. Matchers are dispatched on these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriteriaType {
    Geo,
    Demographic,
    Device,
    Time,
    Interest,
    Tag,
    Value,
    Preference,
    Behavior,
}

impl CriteriaType {
    pub const ALL: [CriteriaType; 9] = [
        CriteriaType::Geo,
        CriteriaType::Demographic,
        CriteriaType::Device,
        CriteriaType::Time,
        CriteriaType::Interest,
        CriteriaType::Tag,
        CriteriaType::Value,
        CriteriaType::Preference,
        CriteriaType::Behavior,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CriteriaType::Geo => "geo",
            CriteriaType::Demographic => "demographic",
            CriteriaType::Device => "device",
            CriteriaType::Time => "time",
            CriteriaType::Interest => "interest",
            CriteriaType::Tag => "tag",
            CriteriaType::Value => "value",
            CriteriaType::Preference => "preference",
            CriteriaType::Behavior => "behavior",
        }
    }
}

impl fmt::Display for CriteriaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CriteriaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CriteriaType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown criteria type '{s}'"))
    }
}

/// Any concrete criteria, tagged by `kind` in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetingCriteria {
    GeoLocation(GeoLocationTargeting),
    AdministrativeGeo(AdministrativeGeoTargeting),
    Demographic(DemographicTargeting),
    Device(DeviceTargeting),
    Time(TimeTargeting),
    Interest(InterestTargeting),
    Tag(TagTargeting),
    Value(ValueTargeting),
    Preference(PreferenceTargeting),
    Behavior(BehaviorTargeting),
}

impl TargetingCriteria {
    pub fn as_predicate(&self) -> &dyn ContextPredicate {
        match self {
            TargetingCriteria::GeoLocation(c) => c,
            TargetingCriteria::AdministrativeGeo(c) => c,
            TargetingCriteria::Demographic(c) => c,
            TargetingCriteria::Device(c) => c,
            TargetingCriteria::Time(c) => c,
            TargetingCriteria::Interest(c) => c,
            TargetingCriteria::Tag(c) => c,
            TargetingCriteria::Value(c) => c,
            TargetingCriteria::Preference(c) => c,
            TargetingCriteria::Behavior(c) => c,
        }
    }

    pub fn criteria_type(&self) -> CriteriaType {
        match self {
            TargetingCriteria::GeoLocation(_) | TargetingCriteria::AdministrativeGeo(_) => {
                CriteriaType::Geo
            }
            TargetingCriteria::Demographic(_) => CriteriaType::Demographic,
            TargetingCriteria::Device(_) => CriteriaType::Device,
            TargetingCriteria::Time(_) => CriteriaType::Time,
            TargetingCriteria::Interest(_) => CriteriaType::Interest,
            TargetingCriteria::Tag(_) => CriteriaType::Tag,
            TargetingCriteria::Value(_) => CriteriaType::Value,
            TargetingCriteria::Preference(_) => CriteriaType::Preference,
            TargetingCriteria::Behavior(_) => CriteriaType::Behavior,
        }
    }

    pub fn base(&self) -> &CriteriaBase {
        self.as_predicate().base()
    }

    pub fn name(&self) -> &str {
        self.base().criteria_name()
    }

    pub fn weight(&self) -> f64 {
        self.base().weight()
    }

    pub fn is_enabled(&self) -> bool {
        self.base().is_enabled()
    }

    pub fn validate(&self) -> ValidationResult {
        self.as_predicate().validate()
    }

    pub fn evaluate(&self, context: &TargetingContext) -> Evaluation {
        let evaluation = self.as_predicate().evaluate_with_conditions(context);
        trace!(
            criteria = %self.name(),
            criteria_type = %self.criteria_type(),
            matched = evaluation.matched,
            score = evaluation.score,
            "Criteria evaluated"
        );
        evaluation
    }
}

macro_rules! criteria_from {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for TargetingCriteria {
                fn from(criteria: $ty) -> Self {
                    TargetingCriteria::$variant(criteria)
                }
            }
        )*
    };
}

criteria_from!(
    GeoLocation => GeoLocationTargeting,
    AdministrativeGeo => AdministrativeGeoTargeting,
    Demographic => DemographicTargeting,
    Device => DeviceTargeting,
    Time => TimeTargeting,
    Interest => InterestTargeting,
    Tag => TagTargeting,
    Value => ValueTargeting,
    Preference => PreferenceTargeting,
    Behavior => BehaviorTargeting,
);

/// Flags a rule that is present but cannot be decoded as the expected type.
pub(crate) fn check_decodable<T: targeting_core::PropertyValue>(
    base: &CriteriaBase,
    rule: &str,
    result: &mut ValidationResult,
) {
    if let Some(entry) = base.get_rule(rule) {
        if entry.value::<T>().is_none() {
            result.add_error(
                "rule_value_invalid",
                format!("rule '{rule}' cannot be read as {:?}", T::property_type()),
                Some(rule),
                Some(entry.value.clone()),
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_criteria_type_round_trip() {
        for t in CriteriaType::ALL {
            assert_eq!(t.as_str().parse::<CriteriaType>().unwrap(), t);
        }
        assert!("weather".parse::<CriteriaType>().is_err());
    }

    #[test]
    fn test_tagged_json_checks_type() {
        let mut tags = TagTargeting::new("vip").unwrap();
        tags.set_required_tags(&["vip".to_string()]).unwrap();
        let criteria = TargetingCriteria::from(tags);
        let json = serde_json::to_string(&criteria).unwrap();
        let back: TargetingCriteria = serde_json::from_str(&json).unwrap();
        assert_eq!(back, criteria);
        assert_eq!(back.criteria_type(), CriteriaType::Tag);

        let wrong = r#"{"kind":"tag","criteria_name":"x","criteria_type":"device"}"#;
        assert!(serde_json::from_str::<TargetingCriteria>(wrong).is_err());
    }

    #[test]
    fn test_condition_operator_decides_match() {
        use targeting_core::facts::TagSet;
        use targeting_core::{ComparisonOperator, PropertyCategory};

        let mut ctx = TargetingContext::new("request").unwrap();
        ctx.set_fact(&TagSet {
            tags: vec!["vip".into()],
        })
        .unwrap();
        ctx.set_value("lifetime_orders", &12i64, PropertyCategory::Behavior)
            .unwrap();

        let mut tags = TagTargeting::new("vip-regulars").unwrap();
        tags.set_required_tags(&["vip".to_string()]).unwrap();
        tags.base_mut()
            .set_condition("lifetime_orders", &10i64, ComparisonOperator::GreaterThanOrEqual)
            .unwrap();
        let at_least = TargetingCriteria::from(tags.clone()).evaluate(&ctx);
        assert!(at_least.matched);
        assert!(at_least.matched_dimensions.contains(&"when:lifetime_orders".to_string()));

        tags.base_mut()
            .set_condition("lifetime_orders", &10i64, ComparisonOperator::LessThan)
            .unwrap();
        // The tag dimensions alone still match.
        assert!(tags.evaluate(&ctx).matched);
        let criteria = TargetingCriteria::from(tags);
        let below = criteria.evaluate(&ctx);
        assert!(!below.matched);
        assert_eq!(below.score, 0.0);
        assert_eq!(below.missed_dimensions, vec!["when:lifetime_orders".to_string()]);

        // Operators survive the JSON form.
        let json = serde_json::to_string(&criteria).unwrap();
        assert!(json.contains("\"operator\":\"less_than\""));
        let back: TargetingCriteria = serde_json::from_str(&json).unwrap();
        assert!(!back.evaluate(&ctx).matched);
    }
}
