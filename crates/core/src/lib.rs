//! Data substrate for the targeting engine: typed context properties,
//! rule-backed criteria configuration, validation results and A/B allocation.

#![warn(clippy::unwrap_used)]

pub mod config;
pub mod context;
pub mod error;
pub mod experimentation;
pub mod facts;
pub mod property;
pub mod rule;
pub mod validation;

pub use config::EngineConfig;
pub use context::TargetingContext;
pub use error::{TargetingError, TargetingResult};
pub use experimentation::{ABTestConfig, ExperimentAssignment, ExperimentEngine, ExperimentGroup};
pub use property::{ContextProperty, Json, PropertyCategory, PropertyType, PropertyValue};
pub use rule::{ComparisonOperator, Criteria, CriteriaBase, TargetingRule};
pub use validation::{ValidationIssue, ValidationResult, ValidationSeverity};
