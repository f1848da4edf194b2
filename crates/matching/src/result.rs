//! Per-matcher and aggregate results of a targeting decision.

use serde::Serialize;
use std::time::Duration;
use targeting_criteria::{CriteriaType, TargetingCriteria};

use crate::error::MatcherError;

/// Outcome of one matcher invocation. The score is always within [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub matcher_id: String,
    pub criteria_type: CriteriaType,
    pub criteria_name: String,
    /// Id of the context that was evaluated.
    pub entity_id: String,
    score: f64,
    pub matched: bool,
    pub explanation: String,
    pub weight: f64,
    pub duration_us: u64,
}

impl MatchResult {
    pub fn new(
        matcher_id: impl Into<String>,
        criteria: &TargetingCriteria,
        entity_id: impl Into<String>,
        score: f64,
        matched: bool,
    ) -> Result<Self, MatcherError> {
        let matcher_id = matcher_id.into();
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            return Err(MatcherError::failed(
                matcher_id,
                format!("score {score} is outside [0, 1]"),
            ));
        }
        Ok(Self {
            matcher_id,
            criteria_type: criteria.criteria_type(),
            criteria_name: criteria.name().to_string(),
            entity_id: entity_id.into(),
            score,
            matched,
            explanation: String::new(),
            weight: criteria.weight(),
            duration_us: 0,
        })
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = explanation.into();
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_us = duration.as_micros() as u64;
        self
    }

    pub fn score(&self) -> f64 {
        self.score
    }
}

/// A criteria entry that produced no result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchFailure {
    /// Position of the criteria in the request.
    pub index: usize,
    pub criteria_name: String,
    pub criteria_type: CriteriaType,
    pub matcher_id: Option<String>,
    pub error: MatcherError,
}

/// Aggregate of one `execute_matching` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallMatchResult {
    /// Successful results, in request order.
    pub results: Vec<MatchResult>,
    pub failures: Vec<MatchFailure>,
    /// Weighted mean of successful scores; 0 when nothing succeeded.
    pub total_score: f64,
    pub from_cache: bool,
    pub duration_us: u64,
}

impl OverallMatchResult {
    pub fn new(results: Vec<MatchResult>, failures: Vec<MatchFailure>) -> Self {
        let total_score = weighted_score(&results);
        Self {
            results,
            failures,
            total_score,
            from_cache: false,
            duration_us: 0,
        }
    }

    pub fn successful_count(&self) -> usize {
        self.results.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    /// At least one matcher succeeded and every successful matcher matched.
    pub fn is_matched(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(|r| r.matched)
    }

    pub fn result_for(&self, criteria_name: &str) -> Option<&MatchResult> {
        self.results.iter().find(|r| r.criteria_name == criteria_name)
    }
}

/// Σ score·weight / Σ weight over the given results. Failed matchers never
/// reach this function, so they count in neither sum.
pub fn weighted_score(results: &[MatchResult]) -> f64 {
    let (weighted, total_weight) = results.iter().fold((0.0, 0.0), |(sum, weights), r| {
        (sum + r.score * r.weight, weights + r.weight)
    });
    if total_weight > 0.0 {
        (weighted / total_weight).clamp(0.0, 1.0)
    } else {
        0.0
    }
}
