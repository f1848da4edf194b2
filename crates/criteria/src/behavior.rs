use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use targeting_core::facts::BehaviorProfile;
use targeting_core::{Criteria, CriteriaBase, TargetingContext, TargetingError, TargetingResult, ValidationResult};

use crate::evaluation::{ContextPredicate, Evaluation};
use crate::{check_decodable, CriteriaType};

const ACTIONS: &str = "actions";
const MIN_ACTION_COUNT: &str = "min_action_count";
const LOOKBACK_DAYS: &str = "lookback_days";
const MIN_SESSION_COUNT: &str = "min_session_count";

pub const MAX_LOOKBACK_DAYS: u32 = 365;

/// Past actions within a lookback window, and engagement by session count.
///
/// The action dimension passes when any listed action was seen at least
/// `min_action_count` times and last seen inside the window. Its score is
/// the share of listed actions that qualify.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CriteriaBase", into = "CriteriaBase")]
pub struct BehaviorTargeting {
    base: CriteriaBase,
}

rule_backed_criteria!(BehaviorTargeting, CriteriaType::Behavior);

impl BehaviorTargeting {
    pub fn actions(&self) -> Vec<String> {
        self.base.get_rule_value_or(ACTIONS, Vec::new())
    }

    pub fn set_actions(&mut self, actions: &[String]) -> TargetingResult<()> {
        self.base.set_rule(ACTIONS, &actions.to_vec())
    }

    pub fn min_action_count(&self) -> u32 {
        self.base.get_rule_value_or(MIN_ACTION_COUNT, 1)
    }

    pub fn set_min_action_count(&mut self, count: u32) -> TargetingResult<()> {
        if count == 0 {
            return Err(TargetingError::invalid(MIN_ACTION_COUNT, "must be at least 1"));
        }
        self.base.set_rule(MIN_ACTION_COUNT, &count)
    }

    pub fn lookback_days(&self) -> Option<u32> {
        self.base.get_rule_value(LOOKBACK_DAYS)
    }

    pub fn set_lookback_days(&mut self, days: u32) -> TargetingResult<()> {
        if days == 0 || days > MAX_LOOKBACK_DAYS {
            return Err(TargetingError::invalid(
                LOOKBACK_DAYS,
                format!("must be within 1..={MAX_LOOKBACK_DAYS}, got {days}"),
            ));
        }
        self.base.set_rule(LOOKBACK_DAYS, &days)
    }

    pub fn min_session_count(&self) -> Option<u32> {
        self.base.get_rule_value(MIN_SESSION_COUNT)
    }

    pub fn set_min_session_count(&mut self, count: u32) -> TargetingResult<()> {
        self.base.set_rule(MIN_SESSION_COUNT, &count)
    }

    pub fn evaluate_at(&self, profile: &BehaviorProfile, now: DateTime<Utc>) -> Evaluation {
        let mut evaluation = Evaluation::new();
        let mut action_share = None;

        let actions = self.actions();
        if !actions.is_empty() {
            let min_count = self.min_action_count();
            let cutoff = self
                .lookback_days()
                .map(|days| now - Duration::days(i64::from(days)));
            let qualifying = actions
                .iter()
                .filter(|name| {
                    profile.action(name).is_some_and(|a| {
                        a.count >= min_count && cutoff.map_or(true, |c| a.last_seen >= c)
                    })
                })
                .count();
            evaluation.record("actions", qualifying > 0);
            action_share = Some(qualifying as f64 / actions.len() as f64);
        }
        if let Some(min_sessions) = self.min_session_count() {
            evaluation.record("sessions", profile.session_count >= min_sessions);
        }

        let evaluation = evaluation.finish();
        match action_share {
            Some(share) if evaluation.matched => evaluation.with_score(share),
            _ => evaluation,
        }
    }
}

impl Criteria for BehaviorTargeting {
    fn base(&self) -> &CriteriaBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CriteriaBase {
        &mut self.base
    }

    fn validate_specific_rules(&self, result: &mut ValidationResult) {
        if self.actions().is_empty() && !self.base.has_rule(MIN_SESSION_COUNT) {
            result.add_error(
                "no_behavior",
                "at least one action or a minimum session count is required",
                Some(ACTIONS),
                None,
            );
        }
        check_decodable::<u32>(&self.base, MIN_ACTION_COUNT, result);
        check_decodable::<u32>(&self.base, LOOKBACK_DAYS, result);
        check_decodable::<u32>(&self.base, MIN_SESSION_COUNT, result);
        if let Some(days) = self.lookback_days() {
            if days == 0 || days > MAX_LOOKBACK_DAYS {
                result.add_error(
                    "lookback_out_of_range",
                    format!("lookback_days must be within 1..={MAX_LOOKBACK_DAYS}"),
                    Some(LOOKBACK_DAYS),
                    Some(days.to_string()),
                );
            }
        }
        if self.min_action_count() == 0 {
            result.add_warning("min_action_count_zero", "a zero count matches actions never taken", Some(MIN_ACTION_COUNT));
        }
    }
}

impl ContextPredicate for BehaviorTargeting {
    fn evaluate(&self, context: &TargetingContext) -> Evaluation {
        let Some(profile) = context.fact::<BehaviorProfile>() else {
            return Evaluation::missing_fact("behavior");
        };
        self.evaluate_at(&profile, context.request_time())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use targeting_core::facts::BehaviorAction;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn profile() -> BehaviorProfile {
        BehaviorProfile {
            actions: vec![
                BehaviorAction {
                    action: "add_to_cart".into(),
                    count: 3,
                    last_seen: now() - Duration::days(2),
                },
                BehaviorAction {
                    action: "purchase".into(),
                    count: 1,
                    last_seen: now() - Duration::days(90),
                },
            ],
            session_count: 12,
            last_active: Some(now()),
        }
    }

    #[test]
    fn test_recent_actions() {
        let mut criteria = BehaviorTargeting::new("cart-abandoners").unwrap();
        criteria
            .set_actions(&["add_to_cart".to_string(), "purchase".to_string()])
            .unwrap();
        criteria.set_lookback_days(30).unwrap();

        let e = criteria.evaluate_at(&profile(), now());
        assert!(e.matched);
        assert_eq!(e.score, 0.5);

        criteria.set_min_action_count(5).unwrap();
        assert!(!criteria.evaluate_at(&profile(), now()).matched);
    }

    #[test]
    fn test_session_threshold_and_missing_profile() {
        let mut criteria = BehaviorTargeting::new("engaged").unwrap();
        criteria.set_min_session_count(10).unwrap();
        assert!(criteria.evaluate_at(&profile(), now()).matched);
        assert!(!criteria.matches(&TargetingContext::new("request").unwrap()));
    }

    #[test]
    fn test_setters_and_validation() {
        let mut criteria = BehaviorTargeting::new("x").unwrap();
        assert!(criteria.set_lookback_days(0).is_err());
        assert!(criteria.set_lookback_days(400).is_err());
        assert!(criteria.set_min_action_count(0).is_err());
        assert!(criteria.validate().has_error("no_behavior"));
        criteria.set_actions(&["view".to_string()]).unwrap();
        assert!(criteria.validate().is_valid());
    }
}
