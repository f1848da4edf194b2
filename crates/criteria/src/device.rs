use serde::{Deserialize, Serialize};
use targeting_core::facts::{ConnectionType, DeviceInfo, DeviceType};
use targeting_core::{Criteria, CriteriaBase, TargetingContext, TargetingResult, ValidationResult};

use crate::evaluation::{contains_ignore_case, ContextPredicate, Evaluation};
use crate::{check_decodable, CriteriaType};

const DEVICE_TYPES: &str = "device_types";
const OPERATING_SYSTEMS: &str = "operating_systems";
const BROWSERS: &str = "browsers";
const BRANDS: &str = "brands";
const CONNECTION_TYPES: &str = "connection_types";
const MIN_SCREEN_WIDTH: &str = "min_screen_width";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CriteriaBase", into = "CriteriaBase")]
pub struct DeviceTargeting {
    base: CriteriaBase,
}

rule_backed_criteria!(DeviceTargeting, CriteriaType::Device);

impl DeviceTargeting {
    pub fn device_types(&self) -> Vec<DeviceType> {
        self.base.get_rule_value_or(DEVICE_TYPES, Vec::new())
    }

    pub fn set_device_types(&mut self, types: &[DeviceType]) -> TargetingResult<()> {
        self.base.set_rule(DEVICE_TYPES, &types.to_vec())
    }

    pub fn operating_systems(&self) -> Vec<String> {
        self.base.get_rule_value_or(OPERATING_SYSTEMS, Vec::new())
    }

    pub fn set_operating_systems(&mut self, systems: &[String]) -> TargetingResult<()> {
        self.base.set_rule(OPERATING_SYSTEMS, &systems.to_vec())
    }

    pub fn browsers(&self) -> Vec<String> {
        self.base.get_rule_value_or(BROWSERS, Vec::new())
    }

    pub fn set_browsers(&mut self, browsers: &[String]) -> TargetingResult<()> {
        self.base.set_rule(BROWSERS, &browsers.to_vec())
    }

    pub fn brands(&self) -> Vec<String> {
        self.base.get_rule_value_or(BRANDS, Vec::new())
    }

    pub fn set_brands(&mut self, brands: &[String]) -> TargetingResult<()> {
        self.base.set_rule(BRANDS, &brands.to_vec())
    }

    pub fn connection_types(&self) -> Vec<ConnectionType> {
        self.base.get_rule_value_or(CONNECTION_TYPES, Vec::new())
    }

    pub fn set_connection_types(&mut self, types: &[ConnectionType]) -> TargetingResult<()> {
        self.base.set_rule(CONNECTION_TYPES, &types.to_vec())
    }

    pub fn min_screen_width(&self) -> Option<u32> {
        self.base.get_rule_value(MIN_SCREEN_WIDTH)
    }

    pub fn set_min_screen_width(&mut self, width: u32) -> TargetingResult<()> {
        self.base.set_rule(MIN_SCREEN_WIDTH, &width)
    }
}

impl Criteria for DeviceTargeting {
    fn base(&self) -> &CriteriaBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CriteriaBase {
        &mut self.base
    }

    fn validate_specific_rules(&self, result: &mut ValidationResult) {
        let configured = [DEVICE_TYPES, OPERATING_SYSTEMS, BROWSERS, BRANDS, CONNECTION_TYPES, MIN_SCREEN_WIDTH]
            .iter()
            .any(|rule| self.base.has_rule(rule));
        if !configured {
            result.add_error(
                "no_dimensions",
                "at least one device dimension must be configured",
                None,
                None,
            );
        }
        check_decodable::<Vec<DeviceType>>(&self.base, DEVICE_TYPES, result);
        check_decodable::<Vec<ConnectionType>>(&self.base, CONNECTION_TYPES, result);
        check_decodable::<u32>(&self.base, MIN_SCREEN_WIDTH, result);
    }
}

impl ContextPredicate for DeviceTargeting {
    fn evaluate(&self, context: &TargetingContext) -> Evaluation {
        let Some(device) = context.fact::<DeviceInfo>() else {
            return Evaluation::missing_fact("device");
        };
        let mut evaluation = Evaluation::new();

        let types = self.device_types();
        if !types.is_empty() {
            evaluation.record("device_type", device.device_type.is_some_and(|t| types.contains(&t)));
        }
        let connections = self.connection_types();
        if !connections.is_empty() {
            evaluation.record(
                "connection",
                device.connection_type.is_some_and(|c| connections.contains(&c)),
            );
        }
        for (dimension, allowed, actual) in [
            ("os", self.operating_systems(), device.os.as_deref()),
            ("browser", self.browsers(), device.browser.as_deref()),
            ("brand", self.brands(), device.brand.as_deref()),
        ] {
            if !allowed.is_empty() {
                evaluation.record(dimension, actual.is_some_and(|v| contains_ignore_case(&allowed, v)));
            }
        }
        if let Some(min_width) = self.min_screen_width() {
            evaluation.record("screen_width", device.screen_width.is_some_and(|w| w >= min_width));
        }

        evaluation.finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn context(device: DeviceInfo) -> TargetingContext {
        let mut ctx = TargetingContext::new("request").unwrap();
        ctx.set_fact(&device).unwrap();
        ctx
    }

    #[test]
    fn test_mobile_ios() {
        let mut criteria = DeviceTargeting::new("mobile-ios").unwrap();
        criteria.set_device_types(&[DeviceType::Mobile, DeviceType::Tablet]).unwrap();
        criteria.set_operating_systems(&["iOS".to_string()]).unwrap();

        let iphone = context(DeviceInfo {
            device_type: Some(DeviceType::Mobile),
            os: Some("ios".into()),
            ..Default::default()
        });
        let e = criteria.evaluate(&iphone);
        assert!(e.matched);
        assert_eq!(e.explanation(), "matched: device_type, os");

        let desktop = context(DeviceInfo {
            device_type: Some(DeviceType::Desktop),
            os: Some("iOS".into()),
            ..Default::default()
        });
        assert_eq!(criteria.score(&desktop), 0.5);
    }

    #[test]
    fn test_screen_width() {
        let mut criteria = DeviceTargeting::new("large-screens").unwrap();
        criteria.set_min_screen_width(1024).unwrap();
        assert!(criteria.matches(&context(DeviceInfo {
            screen_width: Some(1920),
            ..Default::default()
        })));
        assert!(!criteria.matches(&context(DeviceInfo::default())));
    }

    #[test]
    fn test_validation() {
        assert!(DeviceTargeting::new("empty").unwrap().validate().has_error("no_dimensions"));
        let mut bad = DeviceTargeting::new("bad").unwrap();
        bad.base_mut().set_rule(DEVICE_TYPES, &"[\"toaster\"]".to_string()).unwrap();
        assert!(bad.validate().has_error("rule_value_invalid"));
    }
}
