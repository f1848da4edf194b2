use serde::{Deserialize, Serialize};
use targeting_core::facts::UserPreferences;
use targeting_core::{Criteria, CriteriaBase, TargetingContext, TargetingResult, ValidationResult};

use crate::evaluation::{contains_ignore_case, ContextPredicate, Evaluation};
use crate::{check_decodable, CriteriaType};

const AD_CATEGORIES: &str = "ad_categories";
const REQUIRE_CONSENT: &str = "require_consent";
const LANGUAGES: &str = "languages";
const RESPECT_DO_NOT_TRACK: &str = "respect_do_not_track";
const ALLOWED_SCORE: &str = "allowed_score";

/// Honors declared preferences for the candidate ad's categories.
///
/// Blocked categories, missing consent or do-not-track reject the request.
/// Otherwise an ad in a preferred category scores 1.0 and any other allowed
/// ad scores `allowed_score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CriteriaBase", into = "CriteriaBase")]
pub struct PreferenceTargeting {
    base: CriteriaBase,
}

rule_backed_criteria!(PreferenceTargeting, CriteriaType::Preference);

impl PreferenceTargeting {
    pub fn ad_categories(&self) -> Vec<String> {
        self.base.get_rule_value_or(AD_CATEGORIES, Vec::new())
    }

    pub fn set_ad_categories(&mut self, categories: &[String]) -> TargetingResult<()> {
        self.base.set_rule(AD_CATEGORIES, &categories.to_vec())
    }

    pub fn require_consent(&self) -> bool {
        self.base.get_rule_value_or(REQUIRE_CONSENT, false)
    }

    pub fn set_require_consent(&mut self, required: bool) -> TargetingResult<()> {
        self.base.set_rule(REQUIRE_CONSENT, &required)
    }

    pub fn languages(&self) -> Vec<String> {
        self.base.get_rule_value_or(LANGUAGES, Vec::new())
    }

    pub fn set_languages(&mut self, languages: &[String]) -> TargetingResult<()> {
        self.base.set_rule(LANGUAGES, &languages.to_vec())
    }

    pub fn respect_do_not_track(&self) -> bool {
        self.base.get_rule_value_or(RESPECT_DO_NOT_TRACK, true)
    }

    pub fn set_respect_do_not_track(&mut self, respect: bool) -> TargetingResult<()> {
        self.base.set_rule(RESPECT_DO_NOT_TRACK, &respect)
    }

    pub fn allowed_score(&self) -> f64 {
        self.base.get_rule_value_or(ALLOWED_SCORE, 0.6)
    }

    pub fn set_allowed_score(&mut self, score: f64) -> TargetingResult<()> {
        if !(0.0..=1.0).contains(&score) {
            return Err(targeting_core::TargetingError::invalid(
                ALLOWED_SCORE,
                format!("must be within [0, 1], got {score}"),
            ));
        }
        self.base.set_rule(ALLOWED_SCORE, &score)
    }
}

impl Criteria for PreferenceTargeting {
    fn base(&self) -> &CriteriaBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CriteriaBase {
        &mut self.base
    }

    fn validate_specific_rules(&self, result: &mut ValidationResult) {
        if self.ad_categories().is_empty() {
            result.add_warning(
                "no_ad_categories",
                "without ad categories only consent, language and do-not-track are checked",
                Some(AD_CATEGORIES),
            );
        }
        check_decodable::<bool>(&self.base, REQUIRE_CONSENT, result);
        check_decodable::<bool>(&self.base, RESPECT_DO_NOT_TRACK, result);
        check_decodable::<f64>(&self.base, ALLOWED_SCORE, result);
        let score = self.allowed_score();
        if !(0.0..=1.0).contains(&score) {
            result.add_error(
                "allowed_score_out_of_range",
                "allowed_score must be within [0, 1]",
                Some(ALLOWED_SCORE),
                Some(score.to_string()),
            );
        }
    }
}

impl ContextPredicate for PreferenceTargeting {
    fn evaluate(&self, context: &TargetingContext) -> Evaluation {
        let prefs = context.fact::<UserPreferences>().unwrap_or_default();
        let ad_categories = self.ad_categories();
        let mut evaluation = Evaluation::new();

        if !ad_categories.is_empty() {
            let blocked = ad_categories
                .iter()
                .any(|c| contains_ignore_case(&prefs.blocked_categories, c));
            evaluation.record("not_blocked", !blocked);
        }
        if self.require_consent() {
            evaluation.record("consent", prefs.personalization_consent);
        }
        let languages = self.languages();
        if !languages.is_empty() {
            let ok = prefs
                .preferred_language
                .as_deref()
                .is_some_and(|l| contains_ignore_case(&languages, l));
            evaluation.record("language", ok);
        }
        if self.respect_do_not_track() {
            evaluation.record("tracking_allowed", !prefs.do_not_track);
        }

        let evaluation = evaluation.finish();
        if !evaluation.matched {
            return evaluation.with_score(0.0);
        }
        let preferred = ad_categories
            .iter()
            .any(|c| contains_ignore_case(&prefs.preferred_categories, c));
        let score = if preferred { 1.0 } else { self.allowed_score() };
        evaluation.with_score(score)
    }
}
