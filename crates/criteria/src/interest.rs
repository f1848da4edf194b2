use serde::{Deserialize, Serialize};
use targeting_core::facts::{InterestProfile, TagSet};
use targeting_core::{Criteria, CriteriaBase, TargetingContext, TargetingError, TargetingResult, ValidationResult};

use crate::evaluation::{contains_ignore_case, ContextPredicate, Evaluation};
use crate::{check_decodable, CriteriaType};

const CATEGORIES: &str = "categories";
const TAGS: &str = "tags";
const MIN_AFFINITY: &str = "min_affinity";

/// Matches when the subject shows affinity for any configured category or
/// carries any configured interest tag. Score is the strongest affinity
/// found; a tag hit counts as full affinity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CriteriaBase", into = "CriteriaBase")]
pub struct InterestTargeting {
    base: CriteriaBase,
}

rule_backed_criteria!(InterestTargeting, CriteriaType::Interest);

impl InterestTargeting {
    pub fn categories(&self) -> Vec<String> {
        self.base.get_rule_value_or(CATEGORIES, Vec::new())
    }

    pub fn set_categories(&mut self, categories: &[String]) -> TargetingResult<()> {
        self.base.set_rule(CATEGORIES, &categories.to_vec())
    }

    pub fn tags(&self) -> Vec<String> {
        self.base.get_rule_value_or(TAGS, Vec::new())
    }

    pub fn set_tags(&mut self, tags: &[String]) -> TargetingResult<()> {
        self.base.set_rule(TAGS, &tags.to_vec())
    }

    pub fn min_affinity(&self) -> f64 {
        self.base.get_rule_value_or(MIN_AFFINITY, 0.0)
    }

    pub fn set_min_affinity(&mut self, affinity: f64) -> TargetingResult<()> {
        if !(0.0..=1.0).contains(&affinity) {
            return Err(TargetingError::invalid(
                MIN_AFFINITY,
                format!("must be within [0, 1], got {affinity}"),
            ));
        }
        self.base.set_rule(MIN_AFFINITY, &affinity)
    }
}

impl Criteria for InterestTargeting {
    fn base(&self) -> &CriteriaBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CriteriaBase {
        &mut self.base
    }

    fn validate_specific_rules(&self, result: &mut ValidationResult) {
        if self.categories().is_empty() && self.tags().is_empty() {
            result.add_error(
                "no_category_or_tag",
                "at least one of category or tag must be set",
                Some(CATEGORIES),
                None,
            );
        }
        check_decodable::<f64>(&self.base, MIN_AFFINITY, result);
        let min = self.min_affinity();
        if !(0.0..=1.0).contains(&min) {
            result.add_error(
                "affinity_out_of_range",
                "min_affinity must be within [0, 1]",
                Some(MIN_AFFINITY),
                Some(min.to_string()),
            );
        }
    }
}

impl ContextPredicate for InterestTargeting {
    fn evaluate(&self, context: &TargetingContext) -> Evaluation {
        let profile = context.fact::<InterestProfile>().unwrap_or_default();
        let tag_set = context.fact::<TagSet>().unwrap_or_default();
        let min = self.min_affinity();

        let best_category = self
            .categories()
            .iter()
            .filter_map(|wanted| {
                profile
                    .categories
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
                    .map(|(_, affinity)| *affinity)
            })
            .filter(|affinity| *affinity >= min)
            .fold(None, |best: Option<f64>, a| Some(best.map_or(a, |b| b.max(a))));

        let tags = self.tags();
        let tag_hit = tags
            .iter()
            .any(|t| contains_ignore_case(&profile.keywords, t) || tag_set.contains(t));

        let mut evaluation = Evaluation::new();
        let score = match (best_category, tag_hit) {
            (_, true) => {
                evaluation.record("tag", true);
                1.0
            }
            (Some(affinity), false) => {
                evaluation.record("category", true);
                affinity
            }
            (None, false) => {
                evaluation.record("interest", false);
                0.0
            }
        };
        evaluation.finish().with_score(score)
    }
}
