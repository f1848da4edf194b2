//! Outcome of evaluating one criteria object against a context.

use serde::{Deserialize, Serialize};
use targeting_core::{Criteria, CriteriaBase, TargetingContext};

/// Per-dimension tally plus the resulting score.
///
/// A criteria object matches when every configured dimension matched. The
/// graded score is the fraction of configured dimensions that matched,
/// unless the criteria type overrides it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub matched: bool,
    pub score: f64,
    pub matched_dimensions: Vec<String>,
    pub missed_dimensions: Vec<String>,
}

impl Evaluation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, dimension: &str, matched: bool) {
        if matched {
            self.matched_dimensions.push(dimension.to_string());
        } else {
            self.missed_dimensions.push(dimension.to_string());
        }
    }

    /// Derive `matched` and `score` from the tally. Nothing configured
    /// means nothing matched.
    pub fn finish(mut self) -> Self {
        let configured = self.matched_dimensions.len() + self.missed_dimensions.len();
        if configured == 0 {
            self.matched = false;
            self.score = 0.0;
        } else {
            self.matched = self.missed_dimensions.is_empty();
            self.score = self.matched_dimensions.len() as f64 / configured as f64;
        }
        self
    }

    /// Replace the graded score, clamped to [0, 1].
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 };
        self
    }

    /// A failed evaluation when a required fact is missing from the context.
    pub fn missing_fact(fact: &str) -> Self {
        let mut evaluation = Self::new();
        evaluation.record(fact, false);
        evaluation.finish()
    }

    /// Gate on the criteria's property conditions. Each condition is a
    /// further dimension: any miss fails the match and the score scales by
    /// the share of conditions met. Expired properties count as absent.
    pub fn with_conditions(mut self, base: &CriteriaBase, context: &TargetingContext) -> Self {
        let now = context.request_time();
        let (mut total, mut met) = (0usize, 0usize);
        for (key, rule) in base.conditions() {
            let property = context.get_property(key).filter(|p| !p.is_expired_at(now));
            let ok = rule.evaluate_property(property);
            self.record(&rule.name, ok);
            total += 1;
            met += usize::from(ok);
        }
        if total > 0 {
            self.matched &= met == total;
            self.score *= met as f64 / total as f64;
        }
        self
    }

    pub fn explanation(&self) -> String {
        match (self.matched_dimensions.is_empty(), self.missed_dimensions.is_empty()) {
            (true, true) => "no dimensions configured".to_string(),
            (false, true) => format!("matched: {}", self.matched_dimensions.join(", ")),
            (true, false) => format!("missed: {}", self.missed_dimensions.join(", ")),
            (false, false) => format!(
                "matched: {}; missed: {}",
                self.matched_dimensions.join(", "),
                self.missed_dimensions.join(", ")
            ),
        }
    }
}

/// A criteria type that can be evaluated against a context.
pub trait ContextPredicate: Criteria {
    /// The type's own dimensions only.
    fn evaluate(&self, context: &TargetingContext) -> Evaluation;

    /// Own dimensions plus any property conditions on the rule store.
    fn evaluate_with_conditions(&self, context: &TargetingContext) -> Evaluation {
        self.evaluate(context).with_conditions(self.base(), context)
    }

    fn matches(&self, context: &TargetingContext) -> bool {
        self.evaluate_with_conditions(context).matched
    }

    fn score(&self, context: &TargetingContext) -> f64 {
        self.evaluate_with_conditions(context).score
    }
}

pub(crate) fn contains_ignore_case(list: &[String], value: &str) -> bool {
    let value = value.trim();
    list.iter().any(|item| item.trim().eq_ignore_ascii_case(value))
}
