use serde::{Deserialize, Serialize};
use targeting_core::facts::{Gender, UserInfo};
use targeting_core::{Criteria, CriteriaBase, TargetingContext, TargetingError, TargetingResult, ValidationResult};

use crate::evaluation::{contains_ignore_case, ContextPredicate, Evaluation};
use crate::{check_decodable, CriteriaType};

const MIN_AGE: &str = "min_age";
const MAX_AGE: &str = "max_age";
const GENDERS: &str = "genders";
const LANGUAGES: &str = "languages";
const EDUCATION_LEVELS: &str = "education_levels";
const MARITAL_STATUSES: &str = "marital_statuses";
const INCOME_LEVELS: &str = "income_levels";

pub const MAX_TARGETABLE_AGE: u32 = 120;

/// Age range plus optional gender, language, education, marital status
/// and income lists. Every configured dimension must match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CriteriaBase", into = "CriteriaBase")]
pub struct DemographicTargeting {
    base: CriteriaBase,
}

rule_backed_criteria!(DemographicTargeting, CriteriaType::Demographic);

impl DemographicTargeting {
    pub fn min_age(&self) -> Option<u32> {
        self.base.get_rule_value(MIN_AGE)
    }

    pub fn max_age(&self) -> Option<u32> {
        self.base.get_rule_value(MAX_AGE)
    }

    /// Set an inclusive age range. Either bound may be open.
    pub fn set_age_range(&mut self, min: Option<u32>, max: Option<u32>) -> TargetingResult<()> {
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                return Err(TargetingError::invalid(
                    "age_range",
                    format!("min_age {min} is greater than max_age {max}"),
                ));
            }
        }
        if let Some(age) = min.into_iter().chain(max).find(|a| *a > MAX_TARGETABLE_AGE) {
            return Err(TargetingError::invalid(
                "age_range",
                format!("age {age} exceeds {MAX_TARGETABLE_AGE}"),
            ));
        }
        match min {
            Some(min) => self.base.set_rule(MIN_AGE, &min)?,
            None => {
                self.base.remove_rule(MIN_AGE);
            }
        }
        match max {
            Some(max) => self.base.set_rule(MAX_AGE, &max)?,
            None => {
                self.base.remove_rule(MAX_AGE);
            }
        }
        Ok(())
    }

    pub fn genders(&self) -> Vec<Gender> {
        self.base.get_rule_value_or(GENDERS, Vec::new())
    }

    pub fn set_genders(&mut self, genders: &[Gender]) -> TargetingResult<()> {
        self.base.set_rule(GENDERS, &genders.to_vec())
    }

    pub fn languages(&self) -> Vec<String> {
        self.base.get_rule_value_or(LANGUAGES, Vec::new())
    }

    pub fn set_languages(&mut self, languages: &[String]) -> TargetingResult<()> {
        self.base.set_rule(LANGUAGES, &languages.to_vec())
    }

    pub fn education_levels(&self) -> Vec<String> {
        self.base.get_rule_value_or(EDUCATION_LEVELS, Vec::new())
    }

    pub fn set_education_levels(&mut self, levels: &[String]) -> TargetingResult<()> {
        self.base.set_rule(EDUCATION_LEVELS, &levels.to_vec())
    }

    pub fn marital_statuses(&self) -> Vec<String> {
        self.base.get_rule_value_or(MARITAL_STATUSES, Vec::new())
    }

    pub fn set_marital_statuses(&mut self, statuses: &[String]) -> TargetingResult<()> {
        self.base.set_rule(MARITAL_STATUSES, &statuses.to_vec())
    }

    pub fn income_levels(&self) -> Vec<String> {
        self.base.get_rule_value_or(INCOME_LEVELS, Vec::new())
    }

    pub fn set_income_levels(&mut self, levels: &[String]) -> TargetingResult<()> {
        self.base.set_rule(INCOME_LEVELS, &levels.to_vec())
    }

    fn has_any_dimension(&self) -> bool {
        [MIN_AGE, MAX_AGE, GENDERS, LANGUAGES, EDUCATION_LEVELS, MARITAL_STATUSES, INCOME_LEVELS]
            .iter()
            .any(|rule| self.base.has_rule(rule))
    }
}

fn record_list(evaluation: &mut Evaluation, dimension: &str, allowed: &[String], actual: Option<&str>) {
    if !allowed.is_empty() {
        evaluation.record(dimension, actual.is_some_and(|v| contains_ignore_case(allowed, v)));
    }
}

impl Criteria for DemographicTargeting {
    fn base(&self) -> &CriteriaBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CriteriaBase {
        &mut self.base
    }

    fn validate_specific_rules(&self, result: &mut ValidationResult) {
        if !self.has_any_dimension() {
            result.add_error(
                "no_dimensions",
                "at least one demographic dimension must be configured",
                None,
                None,
            );
        }
        check_decodable::<u32>(&self.base, MIN_AGE, result);
        check_decodable::<u32>(&self.base, MAX_AGE, result);
        check_decodable::<Vec<Gender>>(&self.base, GENDERS, result);
        if let (Some(min), Some(max)) = (self.min_age(), self.max_age()) {
            if min > max {
                result.add_error(
                    "age_range_inverted",
                    "min_age must not exceed max_age",
                    Some(MIN_AGE),
                    Some(format!("{min}..{max}")),
                );
            }
        }
        for (field, age) in [(MIN_AGE, self.min_age()), (MAX_AGE, self.max_age())] {
            if let Some(age) = age.filter(|a| *a > MAX_TARGETABLE_AGE) {
                result.add_error(
                    "age_out_of_range",
                    format!("{field} must not exceed {MAX_TARGETABLE_AGE}"),
                    Some(field),
                    Some(age.to_string()),
                );
            }
        }
        if self.min_age().is_some_and(|a| a < 13) {
            result.add_warning("min_age_below_13", "targeting users under 13 is restricted", Some(MIN_AGE));
        }
    }
}

impl ContextPredicate for DemographicTargeting {
    fn evaluate(&self, context: &TargetingContext) -> Evaluation {
        let Some(user) = context.fact::<UserInfo>() else {
            return Evaluation::missing_fact("user");
        };
        let mut evaluation = Evaluation::new();

        let (min, max) = (self.min_age(), self.max_age());
        if min.is_some() || max.is_some() {
            let in_range = user.age.is_some_and(|age| {
                min.map_or(true, |m| age >= m) && max.map_or(true, |m| age <= m)
            });
            evaluation.record("age", in_range);
        }

        let genders = self.genders();
        if !genders.is_empty() {
            evaluation.record("gender", user.gender.is_some_and(|g| genders.contains(&g)));
        }

        record_list(&mut evaluation, "language", &self.languages(), user.language.as_deref());
        record_list(&mut evaluation, "education", &self.education_levels(), user.education.as_deref());
        record_list(&mut evaluation, "marital_status", &self.marital_statuses(), user.marital_status.as_deref());
        record_list(&mut evaluation, "income", &self.income_levels(), user.income_level.as_deref());

        evaluation.finish()
    }
}
