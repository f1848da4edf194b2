//! Structured validation results returned by pre-flight checks on criteria,
//! matchers and experiment configuration. Validation never throws.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: String,
    pub message: String,
    pub field: Option<String>,
    pub attempted_value: Option<String>,
    pub severity: ValidationSeverity,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub summary: String,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(
        &mut self,
        code: impl Into<String>,
        message: impl Into<String>,
        field: Option<&str>,
        attempted_value: Option<String>,
    ) {
        self.errors.push(ValidationIssue {
            code: code.into(),
            message: message.into(),
            field: field.map(str::to_string),
            attempted_value,
            severity: ValidationSeverity::Error,
        });
    }

    pub fn add_warning(
        &mut self,
        code: impl Into<String>,
        message: impl Into<String>,
        field: Option<&str>,
    ) {
        self.warnings.push(ValidationIssue {
            code: code.into(),
            message: message.into(),
            field: field.map(str::to_string),
            attempted_value: None,
            severity: ValidationSeverity::Warning,
        });
    }

    /// Append another result's issues, keeping their order.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Fill in the free-text summary from the collected issues.
    pub fn finish(mut self, subject: &str) -> Self {
        self.summary = if self.is_valid() && self.warnings.is_empty() {
            format!("{subject} is valid")
        } else if self.is_valid() {
            format!("{subject} is valid with {} warning(s)", self.warnings.len())
        } else {
            format!(
                "{subject} has {} error(s) and {} warning(s)",
                self.errors.len(),
                self.warnings.len()
            )
        };
        self
    }

    pub fn has_error(&self, code: &str) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_and_ordering() {
        let mut result = ValidationResult::new();
        result.add_error("weight_negative", "weight must be >= 0", Some("weight"), Some("-1".into()));
        result.add_warning("no_rules", "criteria has no rules", None);
        result.add_error("name_empty", "name must not be empty", Some("name"), None);
        let result = result.finish("demographic criteria");

        assert!(!result.is_valid());
        assert_eq!(result.errors[0].code, "weight_negative");
        assert_eq!(result.errors[1].code, "name_empty");
        assert_eq!(
            result.summary,
            "demographic criteria has 2 error(s) and 1 warning(s)"
        );
        assert!(result.has_error("name_empty"));
    }

    #[test]
    fn test_valid_summary() {
        let result = ValidationResult::new().finish("matcher device");
        assert!(result.is_valid());
        assert_eq!(result.summary, "matcher device is valid");
    }
}
