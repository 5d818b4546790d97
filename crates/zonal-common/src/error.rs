//! Error types for the shared geographic and legend types.

use thiserror::Error;

/// Result type alias using CommonError.
pub type CommonResult<T> = Result<T, CommonError>;

/// Parse and validation errors raised by the common types.
#[derive(Debug, Error)]
pub enum CommonError {
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    #[error("Value out of range: {0}")]
    OutOfRange(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid color: {0}")]
    InvalidColor(String),

    #[error("Invalid legend: {0}")]
    InvalidLegend(String),
}

impl From<serde_json::Error> for CommonError {
    fn from(err: serde_json::Error) -> Self {
        CommonError::InvalidFormat(format!("JSON error: {}", err))
    }
}
