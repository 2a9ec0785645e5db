//! Error types shared across the workspace

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    #[error("Invalid target hour '{input}': {reason}")]
    InvalidTargetHour { input: String, reason: String },
}

impl CommonError {
    pub(crate) fn invalid_hour(input: &str, reason: impl Into<String>) -> Self {
        CommonError::InvalidTargetHour {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}
