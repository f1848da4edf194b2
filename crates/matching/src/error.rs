use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Run-time failure of a single matcher invocation. The manager records
/// these per criteria entry; they never abort a targeting decision.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatcherError {
    #[error("Matcher {matcher_id} timed out after {elapsed_ms} ms")]
    Timeout { matcher_id: String, elapsed_ms: u64 },

    #[error("Matcher {matcher_id} was cancelled")]
    Cancelled { matcher_id: String },

    #[error("No matcher supports criteria type {criteria_type}")]
    UnsupportedCriteria { criteria_type: String },

    #[error("Invalid criteria {criteria}: {summary}")]
    InvalidCriteria { criteria: String, summary: String },

    #[error("Matcher {matcher_id} failed: {message}")]
    Failed { matcher_id: String, message: String },

    #[error("Matcher {matcher_id} panicked")]
    Panicked { matcher_id: String },
}

impl MatcherError {
    pub fn failed(matcher_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            matcher_id: matcher_id.into(),
            message: message.into(),
        }
    }

    /// Timeouts and deadline cancellations both count as timeouts.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Cancelled { .. })
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Cancelled { .. } => "cancelled",
            Self::UnsupportedCriteria { .. } => "unsupported_criteria",
            Self::InvalidCriteria { .. } => "invalid_criteria",
            Self::Failed { .. } => "failed",
            Self::Panicked { .. } => "panicked",
        }
    }
}
