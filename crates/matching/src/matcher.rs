//! The matcher contract: a stateless evaluator for one criteria type.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use targeting_core::{TargetingContext, ValidationResult};
use targeting_criteria::{CriteriaType, TargetingCriteria};

use crate::callbacks::CallbackProvider;
use crate::cancel::CancellationSignal;
use crate::error::MatcherError;
use crate::result::MatchResult;

/// Identity and scheduling hints of a matcher.
#[derive(Debug, Clone, PartialEq)]
pub struct MatcherDescriptor {
    pub id: String,
    pub name: String,
    pub version: String,
    pub matcher_type: CriteriaType,
    /// Lower runs first when several matchers support a type.
    pub priority: i32,
    pub enabled: bool,
    /// Soft budget, used for statistics.
    pub expected_execution_time: Duration,
    /// Hard limit enforced by the manager.
    pub max_execution_time: Duration,
    /// Whether two invocations of this matcher may overlap.
    pub can_run_in_parallel: bool,
}

impl MatcherDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, matcher_type: CriteriaType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            matcher_type,
            priority: 100,
            enabled: true,
            expected_execution_time: Duration::from_millis(1),
            max_execution_time: Duration::from_millis(20),
            can_run_in_parallel: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatcherMetadata {
    pub id: String,
    pub name: String,
    pub version: String,
    pub matcher_type: CriteriaType,
    pub priority: i32,
    pub enabled: bool,
    pub expected_execution_us: u64,
    pub max_execution_us: u64,
    pub can_run_in_parallel: bool,
    pub supported_criteria: Vec<CriteriaType>,
    pub description: String,
}

/// Scores one criteria entry against a context.
///
/// Implementations must not mutate the context and must return
/// `MatcherError::Cancelled` rather than a partial score once `cancel`
/// fires. Lifecycle callbacks are emitted by the caller; `callbacks` is
/// passed through for matcher-specific diagnostics.
#[async_trait]
pub trait TargetingMatcher: Send + Sync {
    fn descriptor(&self) -> &MatcherDescriptor;

    async fn calculate_match_score(
        &self,
        context: &TargetingContext,
        criteria: &TargetingCriteria,
        callbacks: &dyn CallbackProvider,
        cancel: &CancellationSignal,
    ) -> Result<MatchResult, MatcherError>;

    fn id(&self) -> &str {
        &self.descriptor().id
    }

    fn is_enabled(&self) -> bool {
        self.descriptor().enabled
    }

    fn priority(&self) -> i32 {
        self.descriptor().priority
    }

    fn is_supported(&self, criteria_type: CriteriaType) -> bool {
        self.descriptor().matcher_type == criteria_type
    }

    fn description(&self) -> String {
        format!("Evaluates {} criteria", self.descriptor().matcher_type)
    }

    /// Whether this matcher can evaluate the criteria, plus the criteria's
    /// own validation.
    fn validate_criteria(&self, criteria: &TargetingCriteria) -> ValidationResult {
        let mut result = ValidationResult::new();
        let criteria_type = criteria.criteria_type();
        if !self.is_supported(criteria_type) {
            result.add_error(
                "criteria_unsupported",
                format!("matcher '{}' does not support {criteria_type} criteria", self.id()),
                Some("criteria_type"),
                Some(criteria_type.to_string()),
            );
        }
        let own = criteria.validate();
        result.merge(own);
        result.finish(&format!("criteria '{}' for matcher '{}'", criteria.name(), self.id()))
    }

    fn metadata(&self) -> MatcherMetadata {
        let d = self.descriptor();
        MatcherMetadata {
            id: d.id.clone(),
            name: d.name.clone(),
            version: d.version.clone(),
            matcher_type: d.matcher_type,
            priority: d.priority,
            enabled: d.enabled,
            expected_execution_us: d.expected_execution_time.as_micros() as u64,
            max_execution_us: d.max_execution_time.as_micros() as u64,
            can_run_in_parallel: d.can_run_in_parallel,
            supported_criteria: CriteriaType::ALL
                .into_iter()
                .filter(|t| self.is_supported(*t))
                .collect(),
            description: self.description(),
        }
    }

    /// Checks on the matcher's own descriptor, run before registration.
    fn self_validate(&self) -> ValidationResult {
        let d = self.descriptor();
        let mut result = ValidationResult::new();
        for (field, value) in [("id", &d.id), ("name", &d.name), ("version", &d.version)] {
            if value.trim().is_empty() {
                result.add_error("descriptor_field_empty", format!("{field} must not be empty"), Some(field), None);
            }
        }
        if d.max_execution_time.is_zero() {
            result.add_error(
                "max_execution_time_zero",
                "max execution time must be positive",
                Some("max_execution_time"),
                None,
            );
        } else if d.expected_execution_time > d.max_execution_time {
            result.add_warning(
                "expected_exceeds_max",
                format!(
                    "expected execution time {:?} exceeds the hard limit {:?}",
                    d.expected_execution_time, d.max_execution_time
                ),
                Some("expected_execution_time"),
            );
        }
        result.finish(&format!("matcher '{}'", d.id))
    }
}
