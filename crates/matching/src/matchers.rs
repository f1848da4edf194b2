//! Built-in matchers, one per criteria type, each delegating to the
//! criteria's own predicate.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use targeting_core::TargetingContext;
use targeting_criteria::{CriteriaType, TargetingCriteria};

use crate::callbacks::CallbackProvider;
use crate::cancel::CancellationSignal;
use crate::error::MatcherError;
use crate::matcher::{MatcherDescriptor, TargetingMatcher};
use crate::result::MatchResult;

/// Generic matcher for one criteria type. Its id is the type name
/// (`geo`, `device`, ...).
#[derive(Debug, Clone)]
pub struct CriteriaMatcher {
    descriptor: MatcherDescriptor,
}

impl CriteriaMatcher {
    pub fn new(criteria_type: CriteriaType) -> Self {
        let (name, priority, expected_us) = match criteria_type {
            CriteriaType::Geo => ("Geo fence matcher", 10, 2_000),
            CriteriaType::Device => ("Device matcher", 20, 500),
            CriteriaType::Time => ("Daypart matcher", 30, 500),
            CriteriaType::Demographic => ("Demographic matcher", 40, 500),
            CriteriaType::Preference => ("Preference matcher", 50, 500),
            CriteriaType::Interest => ("Interest matcher", 60, 1_000),
            CriteriaType::Tag => ("Tag matcher", 70, 500),
            CriteriaType::Value => ("Value tier matcher", 80, 500),
            CriteriaType::Behavior => ("Behavior matcher", 90, 1_000),
        };
        let mut descriptor = MatcherDescriptor::new(criteria_type.as_str(), name, criteria_type);
        descriptor.priority = priority;
        descriptor.expected_execution_time = Duration::from_micros(expected_us);
        Self { descriptor }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.descriptor.priority = priority;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.descriptor.enabled = enabled;
        self
    }

    pub fn with_max_execution_time(mut self, max: Duration) -> Self {
        self.descriptor.max_execution_time = max;
        self
    }
}

#[async_trait]
impl TargetingMatcher for CriteriaMatcher {
    fn descriptor(&self) -> &MatcherDescriptor {
        &self.descriptor
    }

    async fn calculate_match_score(
        &self,
        context: &TargetingContext,
        criteria: &TargetingCriteria,
        callbacks: &dyn CallbackProvider,
        cancel: &CancellationSignal,
    ) -> Result<MatchResult, MatcherError> {
        let id = self.id();
        cancel.check(id)?;
        let criteria_type = criteria.criteria_type();
        if !self.is_supported(criteria_type) {
            return Err(MatcherError::UnsupportedCriteria {
                criteria_type: criteria_type.to_string(),
            });
        }
        let validation = criteria.validate();
        if !validation.is_valid() {
            return Err(MatcherError::InvalidCriteria {
                criteria: criteria.name().to_string(),
                summary: validation.summary,
            });
        }

        let start = Instant::now();
        let evaluation = criteria.evaluate(context);
        cancel.check(id)?;

        let explanation = evaluation.explanation();
        callbacks.on_match_detail(id, &explanation);
        Ok(
            MatchResult::new(id, criteria, context.context_id(), evaluation.score, evaluation.matched)?
                .with_explanation(explanation)
                .with_duration(start.elapsed()),
        )
    }
}

/// One matcher per criteria type, with built-in defaults.
pub fn default_matchers() -> Vec<Arc<dyn TargetingMatcher>> {
    CriteriaType::ALL
        .into_iter()
        .map(|t| Arc::new(CriteriaMatcher::new(t)) as Arc<dyn TargetingMatcher>)
        .collect()
}
