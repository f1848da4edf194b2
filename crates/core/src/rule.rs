//! Rule-keyed configuration shared by every criteria type.
//!
//! A `CriteriaBase` owns an ordered list of named rules whose values are
//! stored with the same typed serialization as context properties. Concrete
//! criteria embed a base and layer typed accessors and their own validation
//! on top of it through the [`Criteria`] trait.

use crate::error::{TargetingError, TargetingResult};
use crate::property::{raw_to_json, ContextProperty, PropertyCategory, PropertyType, PropertyValue};
use crate::validation::ValidationResult;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    #[default]
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    InList,
    NotInList,
    /// Expected value is a two-element `[low, high]` array, inclusive.
    Between,
    IsSet,
    IsNotSet,
}

#[allow(clippy::unnecessary_map_or)]
pub fn compare_values(
    actual: &serde_json::Value,
    operator: ComparisonOperator,
    expected: &serde_json::Value,
) -> bool {
    match operator {
        ComparisonOperator::Equals => actual == expected,
        ComparisonOperator::NotEquals => actual != expected,
        ComparisonOperator::GreaterThan => {
            numeric_cmp(actual, expected).map_or(false, |o| o == Ordering::Greater)
        }
        ComparisonOperator::GreaterThanOrEqual => {
            numeric_cmp(actual, expected).map_or(false, |o| o != Ordering::Less)
        }
        ComparisonOperator::LessThan => {
            numeric_cmp(actual, expected).map_or(false, |o| o == Ordering::Less)
        }
        ComparisonOperator::LessThanOrEqual => {
            numeric_cmp(actual, expected).map_or(false, |o| o != Ordering::Greater)
        }
        ComparisonOperator::Contains => match actual {
            serde_json::Value::Array(items) => items.contains(expected),
            _ => actual
                .as_str()
                .zip(expected.as_str())
                .map_or(false, |(a, e)| a.contains(e)),
        },
        ComparisonOperator::NotContains => {
            !compare_values(actual, ComparisonOperator::Contains, expected)
        }
        ComparisonOperator::StartsWith => actual
            .as_str()
            .zip(expected.as_str())
            .map_or(false, |(a, e)| a.starts_with(e)),
        ComparisonOperator::EndsWith => actual
            .as_str()
            .zip(expected.as_str())
            .map_or(false, |(a, e)| a.ends_with(e)),
        ComparisonOperator::InList => expected
            .as_array()
            .map_or(false, |list| list.contains(actual)),
        ComparisonOperator::NotInList => expected
            .as_array()
            .map_or(true, |list| !list.contains(actual)),
        ComparisonOperator::Between => match expected.as_array().map(Vec::as_slice) {
            Some([low, high]) => {
                numeric_cmp(actual, low).map_or(false, |o| o != Ordering::Less)
                    && numeric_cmp(actual, high).map_or(false, |o| o != Ordering::Greater)
            }
            _ => false,
        },
        ComparisonOperator::IsSet => !actual.is_null(),
        ComparisonOperator::IsNotSet => actual.is_null(),
    }
}

fn numeric_cmp(a: &serde_json::Value, b: &serde_json::Value) -> Option<Ordering> {
    let a_num = a.as_f64()?;
    let b_num = b.as_f64()?;
    a_num.partial_cmp(&b_num)
}

/// One named configuration entry of a criteria object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetingRule {
    pub name: String,
    pub value: String,
    pub value_type: PropertyType,
    #[serde(default)]
    pub category: PropertyCategory,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default = "default_rule_weight")]
    pub weight: f64,
    #[serde(default)]
    pub operator: ComparisonOperator,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_rule_weight() -> f64 {
    1.0
}

impl TargetingRule {
    pub fn new<T: PropertyValue>(name: impl Into<String>, value: &T) -> TargetingResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TargetingError::invalid("name", "rule name must not be empty"));
        }
        Ok(Self {
            name,
            value: value.to_raw(),
            value_type: T::property_type(),
            category: PropertyCategory::General,
            is_required: false,
            weight: 1.0,
            operator: ComparisonOperator::Equals,
            description: None,
        })
    }

    pub fn with_operator(mut self, operator: ComparisonOperator) -> Self {
        self.operator = operator;
        self
    }

    pub fn with_category(mut self, category: PropertyCategory) -> Self {
        self.category = category;
        self
    }

    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn value<T: PropertyValue>(&self) -> Option<T> {
        T::from_raw(&self.value)
    }

    /// The stored value as JSON; plain strings that are not JSON become JSON strings.
    pub fn json_value(&self) -> serde_json::Value {
        raw_to_json(&self.value, self.value_type)
    }

    /// Apply the rule's operator with its stored value as the expected side.
    pub fn evaluate(&self, actual: &serde_json::Value) -> bool {
        compare_values(actual, self.operator, &self.json_value())
    }

    /// Compare a context property; an absent property compares as null.
    pub fn evaluate_property(&self, property: Option<&ContextProperty>) -> bool {
        let actual = property.map_or(serde_json::Value::Null, ContextProperty::json_value);
        self.evaluate(&actual)
    }

    /// Property key of a condition rule.
    pub fn condition_key(&self) -> Option<&str> {
        self.name.strip_prefix(CONDITION_PREFIX)
    }
}

/// Rule name prefix for property conditions: `when:<property key>`.
pub const CONDITION_PREFIX: &str = "when:";

/// Storage and common validation for a criteria object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaBase {
    criteria_name: String,
    criteria_type: String,
    #[serde(default = "default_rule_weight")]
    weight: f64,
    #[serde(default = "default_enabled")]
    is_enabled: bool,
    #[serde(default)]
    rules: Vec<TargetingRule>,
}

fn default_enabled() -> bool {
    true
}

impl CriteriaBase {
    pub fn new(
        criteria_name: impl Into<String>,
        criteria_type: impl Into<String>,
    ) -> TargetingResult<Self> {
        let criteria_type = criteria_type.into();
        if criteria_type.trim().is_empty() {
            return Err(TargetingError::invalid(
                "criteria_type",
                "criteria type id must not be empty",
            ));
        }
        Ok(Self {
            criteria_name: criteria_name.into(),
            criteria_type,
            weight: 1.0,
            is_enabled: true,
            rules: Vec::new(),
        })
    }

    pub fn criteria_name(&self) -> &str {
        &self.criteria_name
    }

    pub fn criteria_type(&self) -> &str {
        &self.criteria_type
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: f64) -> TargetingResult<()> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(TargetingError::invalid(
                "weight",
                format!("criteria weight must be a non-negative number, got {weight}"),
            ));
        }
        self.weight = weight;
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.is_enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.is_enabled = enabled;
    }

    pub fn rules(&self) -> &[TargetingRule] {
        &self.rules
    }

    pub fn get_rule(&self, name: &str) -> Option<&TargetingRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    pub fn has_rule(&self, name: &str) -> bool {
        self.get_rule(name).is_some()
    }

    /// Decode a rule value; `None` when missing or unparseable.
    pub fn get_rule_value<T: PropertyValue>(&self, name: &str) -> Option<T> {
        self.get_rule(name).and_then(TargetingRule::value)
    }

    pub fn get_rule_value_or<T: PropertyValue>(&self, name: &str, default: T) -> T {
        self.get_rule_value(name).unwrap_or(default)
    }

    /// Replace or append a rule wholesale. Replacement keeps the rule's position.
    pub fn set_rule_entry(&mut self, rule: TargetingRule) {
        match self.rules.iter_mut().find(|r| r.name == rule.name) {
            Some(existing) => *existing = rule,
            None => self.rules.push(rule),
        }
    }

    pub fn set_rule<T: PropertyValue>(&mut self, name: &str, value: &T) -> TargetingResult<()> {
        let rule = TargetingRule::new(name, value)?;
        self.set_rule_entry(rule);
        Ok(())
    }

    /// Require a context property to satisfy `operator` against `value`
    /// in addition to the criteria's own dimensions.
    pub fn set_condition<T: PropertyValue>(
        &mut self,
        property_key: &str,
        value: &T,
        operator: ComparisonOperator,
    ) -> TargetingResult<()> {
        if property_key.trim().is_empty() {
            return Err(TargetingError::invalid(
                "condition",
                "condition property key must not be empty",
            ));
        }
        let rule = TargetingRule::new(format!("{CONDITION_PREFIX}{property_key}"), value)?
            .with_operator(operator);
        self.set_rule_entry(rule);
        Ok(())
    }

    /// Condition rules with the property key each one reads.
    pub fn conditions(&self) -> impl Iterator<Item = (&str, &TargetingRule)> {
        self.rules.iter().filter_map(|r| r.condition_key().map(|key| (key, r)))
    }

    pub fn remove_rule(&mut self, name: &str) -> Option<TargetingRule> {
        let index = self.rules.iter().position(|r| r.name == name)?;
        Some(self.rules.remove(index))
    }

    /// Checks every criteria type shares.
    pub fn validate_common(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        if self.criteria_type.trim().is_empty() {
            result.add_error(
                "criteria_type_empty",
                "criteria type id must not be empty",
                Some("criteria_type"),
                None,
            );
        }
        if !self.weight.is_finite() || self.weight < 0.0 {
            result.add_error(
                "weight_negative",
                "criteria weight must be a non-negative number",
                Some("weight"),
                Some(self.weight.to_string()),
            );
        }
        if self.weight == 0.0 {
            result.add_warning(
                "weight_zero",
                "criteria with zero weight never contributes to the total score",
                Some("weight"),
            );
        }
        for rule in &self.rules {
            if rule.name.trim().is_empty() {
                result.add_error("rule_name_empty", "rule name must not be empty", Some("rules"), None);
            }
            if rule.is_required && rule.value.trim().is_empty() {
                result.add_error(
                    "required_rule_empty",
                    format!("required rule '{}' has no value", rule.name),
                    Some(&rule.name),
                    None,
                );
            }
        }
        result
    }
}

/// Behaviour shared by all concrete criteria types.
pub trait Criteria {
    fn base(&self) -> &CriteriaBase;

    fn base_mut(&mut self) -> &mut CriteriaBase;

    /// Type-specific completeness and range checks.
    fn validate_specific_rules(&self, result: &mut ValidationResult);

    /// Common checks AND the type-specific ones.
    fn validate(&self) -> ValidationResult {
        let mut result = self.base().validate_common();
        self.validate_specific_rules(&mut result);
        let subject = format!("{} criteria '{}'", self.base().criteria_type(), self.base().criteria_name());
        result.finish(&subject)
    }

    fn name(&self) -> &str {
        self.base().criteria_name()
    }

    fn weight(&self) -> f64 {
        self.base().weight()
    }

    fn is_enabled(&self) -> bool {
        self.base().is_enabled()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compare_values() {
        assert!(compare_values(&json!(5), ComparisonOperator::GreaterThan, &json!(3)));
        assert!(!compare_values(&json!("a"), ComparisonOperator::GreaterThan, &json!(3)));
        assert!(compare_values(&json!(25), ComparisonOperator::Between, &json!([18, 34])));
        assert!(!compare_values(&json!(35), ComparisonOperator::Between, &json!([18, 34])));
        assert!(compare_values(&json!("US"), ComparisonOperator::InList, &json!(["US", "CA"])));
        assert!(compare_values(&json!(["a", "b"]), ComparisonOperator::Contains, &json!("b")));
        assert!(compare_values(&json!("sports/news"), ComparisonOperator::StartsWith, &json!("sports")));
        assert!(compare_values(&json!(null), ComparisonOperator::IsNotSet, &json!(null)));
    }

    #[test]
    fn test_rule_evaluate_uses_stored_value() {
        let rule = TargetingRule::new("min_age", &18u32)
            .unwrap()
            .with_operator(ComparisonOperator::GreaterThanOrEqual);
        assert!(rule.evaluate(&json!(18)));
        assert!(!rule.evaluate(&json!(17)));

        let rule = TargetingRule::new("os", &"ios".to_string()).unwrap();
        assert!(rule.evaluate(&json!("ios")));
    }

    #[test]
    fn test_conditions_read_context_properties() {
        let mut base = CriteriaBase::new("premium", "tag").unwrap();
        base.set_rule("required_tags", &vec!["vip".to_string()]).unwrap();
        base.set_condition("segment", &vec!["gold".to_string(), "platinum".to_string()], ComparisonOperator::InList)
            .unwrap();
        assert!(base.set_condition(" ", &1i64, ComparisonOperator::Equals).is_err());

        let conditions: Vec<_> = base.conditions().collect();
        assert_eq!(conditions.len(), 1);
        let (key, rule) = conditions[0];
        assert_eq!(key, "segment");

        let gold = ContextProperty::new("segment", &"gold".to_string()).unwrap();
        let bronze = ContextProperty::new("segment", &"bronze".to_string()).unwrap();
        assert!(rule.evaluate_property(Some(&gold)));
        assert!(!rule.evaluate_property(Some(&bronze)));
        assert!(!rule.evaluate_property(None));

        let unset = TargetingRule::new("when:opt_out", &true)
            .unwrap()
            .with_operator(ComparisonOperator::IsNotSet);
        assert!(unset.evaluate_property(None));
    }

    #[test]
    fn test_rule_store_accessors() {
        let mut base = CriteriaBase::new("adults", "demographic").unwrap();
        base.set_rule("min_age", &18u32).unwrap();
        base.set_rule("max_age", &65u32).unwrap();
        assert_eq!(base.get_rule_value::<u32>("min_age"), Some(18));
        assert_eq!(base.get_rule_value_or("missing", 7u32), 7);
        // Parse failure falls back to the default.
        assert!(!base.get_rule_value_or("min_age", false));

        base.set_rule("min_age", &21u32).unwrap();
        assert_eq!(base.rules()[0].name, "min_age");
        assert_eq!(base.get_rule_value::<u32>("min_age"), Some(21));

        assert!(base.remove_rule("max_age").is_some());
        assert!(base.remove_rule("max_age").is_none());
        assert_eq!(base.rules().len(), 1);
    }

    #[test]
    fn test_common_validation() {
        assert!(CriteriaBase::new("x", "").is_err());

        let mut base = CriteriaBase::new("x", "tag").unwrap();
        assert!(base.set_weight(-1.0).is_err());
        base.set_weight(0.0).unwrap();
        let result = base.validate_common();
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);

        let negative: CriteriaBase =
            serde_json::from_str(r#"{"criteria_name":"x","criteria_type":"tag","weight":-2.0}"#)
                .unwrap();
        assert!(negative.validate_common().has_error("weight_negative"));
    }
}
