use serde::{Deserialize, Serialize};
use targeting_core::facts::{UserInfo, ValueTier};
use targeting_core::{
    Criteria, CriteriaBase, Json, TargetingContext, TargetingError, TargetingResult, ValidationResult,
};

use crate::evaluation::{ContextPredicate, Evaluation};
use crate::{check_decodable, CriteriaType};

const MIN_TIER: &str = "min_tier";
const MIN_LIFETIME_VALUE: &str = "min_lifetime_value";
const MAX_LIFETIME_VALUE: &str = "max_lifetime_value";
const MIN_PURCHASE_COUNT: &str = "min_purchase_count";

/// Customer-value thresholds: tier, lifetime value range and purchase count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CriteriaBase", into = "CriteriaBase")]
pub struct ValueTargeting {
    base: CriteriaBase,
}

rule_backed_criteria!(ValueTargeting, CriteriaType::Value);

impl ValueTargeting {
    pub fn min_tier(&self) -> Option<ValueTier> {
        self.base.get_rule_value::<Json<ValueTier>>(MIN_TIER).map(|t| t.0)
    }

    pub fn set_min_tier(&mut self, tier: ValueTier) -> TargetingResult<()> {
        self.base.set_rule(MIN_TIER, &Json(tier))
    }

    pub fn lifetime_value_range(&self) -> (Option<f64>, Option<f64>) {
        (
            self.base.get_rule_value(MIN_LIFETIME_VALUE),
            self.base.get_rule_value(MAX_LIFETIME_VALUE),
        )
    }

    pub fn set_lifetime_value_range(&mut self, min: Option<f64>, max: Option<f64>) -> TargetingResult<()> {
        if min.into_iter().chain(max).any(|v| !v.is_finite() || v < 0.0) {
            return Err(TargetingError::invalid(
                "lifetime_value",
                "lifetime value bounds must be non-negative numbers",
            ));
        }
        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi {
                return Err(TargetingError::invalid(
                    "lifetime_value",
                    format!("minimum {lo} exceeds maximum {hi}"),
                ));
            }
        }
        for (rule, value) in [(MIN_LIFETIME_VALUE, min), (MAX_LIFETIME_VALUE, max)] {
            match value {
                Some(v) => self.base.set_rule(rule, &v)?,
                None => {
                    self.base.remove_rule(rule);
                }
            }
        }
        Ok(())
    }

    pub fn min_purchase_count(&self) -> Option<u32> {
        self.base.get_rule_value(MIN_PURCHASE_COUNT)
    }

    pub fn set_min_purchase_count(&mut self, count: u32) -> TargetingResult<()> {
        self.base.set_rule(MIN_PURCHASE_COUNT, &count)
    }
}

impl Criteria for ValueTargeting {
    fn base(&self) -> &CriteriaBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CriteriaBase {
        &mut self.base
    }

    fn validate_specific_rules(&self, result: &mut ValidationResult) {
        let configured = [MIN_TIER, MIN_LIFETIME_VALUE, MAX_LIFETIME_VALUE, MIN_PURCHASE_COUNT]
            .iter()
            .any(|rule| self.base.has_rule(rule));
        if !configured {
            result.add_error("no_thresholds", "at least one value threshold must be set", None, None);
        }
        check_decodable::<Json<ValueTier>>(&self.base, MIN_TIER, result);
        check_decodable::<f64>(&self.base, MIN_LIFETIME_VALUE, result);
        check_decodable::<f64>(&self.base, MAX_LIFETIME_VALUE, result);
        check_decodable::<u32>(&self.base, MIN_PURCHASE_COUNT, result);

        let (min, max) = self.lifetime_value_range();
        if min.into_iter().chain(max).any(|v| v < 0.0) {
            result.add_error(
                "lifetime_value_negative",
                "lifetime value bounds must be non-negative",
                Some(MIN_LIFETIME_VALUE),
                None,
            );
        }
        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi {
                result.add_error(
                    "lifetime_value_inverted",
                    "min_lifetime_value must not exceed max_lifetime_value",
                    Some(MIN_LIFETIME_VALUE),
                    Some(format!("{lo}..{hi}")),
                );
            }
        }
    }
}

impl ContextPredicate for ValueTargeting {
    fn evaluate(&self, context: &TargetingContext) -> Evaluation {
        let Some(user) = context.fact::<UserInfo>() else {
            return Evaluation::missing_fact("user");
        };
        let mut evaluation = Evaluation::new();
        if let Some(min_tier) = self.min_tier() {
            evaluation.record("tier", user.value_tier.is_some_and(|t| t >= min_tier));
        }
        let (min, max) = self.lifetime_value_range();
        if min.is_some() || max.is_some() {
            let ok = user.lifetime_value.is_some_and(|v| {
                min.map_or(true, |lo| v >= lo) && max.map_or(true, |hi| v <= hi)
            });
            evaluation.record("lifetime_value", ok);
        }
        if let Some(min_count) = self.min_purchase_count() {
            evaluation.record("purchases", user.purchase_count.is_some_and(|c| c >= min_count));
        }
        evaluation.finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn context(user: UserInfo) -> TargetingContext {
        let mut ctx = TargetingContext::new("request").unwrap();
        ctx.set_fact(&user).unwrap();
        ctx
    }

    #[test]
    fn test_high_value_customers() {
        let mut criteria = ValueTargeting::new("high-value").unwrap();
        criteria.set_min_tier(ValueTier::High).unwrap();
        criteria.set_lifetime_value_range(Some(500.0), None).unwrap();

        assert!(criteria.matches(&context(UserInfo {
            value_tier: Some(ValueTier::Premium),
            lifetime_value: Some(1_200.0),
            ..Default::default()
        })));
        let e = criteria.evaluate(&context(UserInfo {
            value_tier: Some(ValueTier::Medium),
            lifetime_value: Some(800.0),
            ..Default::default()
        }));
        assert!(!e.matched);
        assert_eq!(e.missed_dimensions, vec!["tier".to_string()]);
    }

    #[test]
    fn test_purchase_count() {
        let mut criteria = ValueTargeting::new("repeat-buyers").unwrap();
        criteria.set_min_purchase_count(3).unwrap();
        assert!(criteria.matches(&context(UserInfo {
            purchase_count: Some(3),
            ..Default::default()
        })));
        assert!(!criteria.matches(&context(UserInfo::default())));
    }

    #[test]
    fn test_setters_and_validation() {
        let mut criteria = ValueTargeting::new("x").unwrap();
        assert!(criteria.set_lifetime_value_range(Some(10.0), Some(5.0)).is_err());
        assert!(criteria.set_lifetime_value_range(Some(-1.0), None).is_err());
        assert!(criteria.validate().has_error("no_thresholds"));
        criteria.set_min_tier(ValueTier::Low).unwrap();
        assert!(criteria.validate().is_valid());
    }
}
