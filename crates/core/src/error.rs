use thiserror::Error;

pub type TargetingResult<T> = Result<T, TargetingError>;

#[derive(Error, Debug)]
pub enum TargetingError {
    #[error("Invalid {field}: {message}")]
    InvalidArgument { field: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TargetingError {
    /// Field-specific configuration error raised at construction or mutation time.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            Self::InvalidArgument { field, .. } => Some(field),
            _ => None,
        }
    }
}
