use serde::{Deserialize, Serialize};
use targeting_core::facts::TagSet;
use targeting_core::{Criteria, CriteriaBase, TargetingContext, TargetingResult, ValidationResult};

use crate::evaluation::{ContextPredicate, Evaluation};
use crate::CriteriaType;

const REQUIRED_TAGS: &str = "required_tags";
const ANY_TAGS: &str = "any_tags";
const EXCLUDED_TAGS: &str = "excluded_tags";

/// All of `required_tags`, at least one of `any_tags`, none of `excluded_tags`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CriteriaBase", into = "CriteriaBase")]
pub struct TagTargeting {
    base: CriteriaBase,
}

rule_backed_criteria!(TagTargeting, CriteriaType::Tag);

impl TagTargeting {
    pub fn required_tags(&self) -> Vec<String> {
        self.base.get_rule_value_or(REQUIRED_TAGS, Vec::new())
    }

    pub fn set_required_tags(&mut self, tags: &[String]) -> TargetingResult<()> {
        self.base.set_rule(REQUIRED_TAGS, &tags.to_vec())
    }

    pub fn any_tags(&self) -> Vec<String> {
        self.base.get_rule_value_or(ANY_TAGS, Vec::new())
    }

    pub fn set_any_tags(&mut self, tags: &[String]) -> TargetingResult<()> {
        self.base.set_rule(ANY_TAGS, &tags.to_vec())
    }

    pub fn excluded_tags(&self) -> Vec<String> {
        self.base.get_rule_value_or(EXCLUDED_TAGS, Vec::new())
    }

    pub fn set_excluded_tags(&mut self, tags: &[String]) -> TargetingResult<()> {
        self.base.set_rule(EXCLUDED_TAGS, &tags.to_vec())
    }
}

impl Criteria for TagTargeting {
    fn base(&self) -> &CriteriaBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CriteriaBase {
        &mut self.base
    }

    fn validate_specific_rules(&self, result: &mut ValidationResult) {
        let (required, any, excluded) = (self.required_tags(), self.any_tags(), self.excluded_tags());
        if required.is_empty() && any.is_empty() && excluded.is_empty() {
            result.add_error("no_tags", "at least one tag list must be non-empty", None, None);
        }
        for tag in &required {
            if excluded.iter().any(|e| e.eq_ignore_ascii_case(tag)) {
                result.add_error(
                    "tag_conflict",
                    format!("tag '{tag}' is both required and excluded"),
                    Some(EXCLUDED_TAGS),
                    Some(tag.clone()),
                );
            }
        }
        if required.iter().chain(&any).chain(&excluded).any(|t| t.trim().is_empty()) {
            result.add_warning("blank_tag", "blank tags never match", None);
        }
    }
}

impl ContextPredicate for TagTargeting {
    fn evaluate(&self, context: &TargetingContext) -> Evaluation {
        let tags = context.fact::<TagSet>().unwrap_or_default();
        let mut evaluation = Evaluation::new();
        for required in self.required_tags() {
            evaluation.record(&format!("required:{required}"), tags.contains(&required));
        }
        let any = self.any_tags();
        if !any.is_empty() {
            evaluation.record("any", any.iter().any(|t| tags.contains(t)));
        }
        let excluded = self.excluded_tags();
        if !excluded.is_empty() {
            evaluation.record("not_excluded", !excluded.iter().any(|t| tags.contains(t)));
        }
        evaluation.finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn context(tags: &[&str]) -> TargetingContext {
        let mut ctx = TargetingContext::new("request").unwrap();
        ctx.set_fact(&TagSet {
            tags: tags.iter().map(|t| t.to_string()).collect(),
        })
        .unwrap();
        ctx
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_tag_lists() {
        let mut criteria = TagTargeting::new("loyal-shoppers").unwrap();
        criteria.set_required_tags(&strings(&["member"])).unwrap();
        criteria.set_any_tags(&strings(&["gold", "platinum"])).unwrap();
        criteria.set_excluded_tags(&strings(&["churned"])).unwrap();

        assert!(criteria.matches(&context(&["MEMBER", "gold"])));
        assert!(!criteria.matches(&context(&["member", "gold", "churned"])));

        let e = criteria.evaluate(&context(&["member"]));
        assert!(!e.matched);
        assert!((e.score - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_validation() {
        assert!(TagTargeting::new("empty").unwrap().validate().has_error("no_tags"));
        let mut conflict = TagTargeting::new("conflict").unwrap();
        conflict.set_required_tags(&strings(&["a"])).unwrap();
        conflict.set_excluded_tags(&strings(&["A"])).unwrap();
        assert!(conflict.validate().has_error("tag_conflict"));
    }
}
