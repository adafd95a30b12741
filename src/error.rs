//! Error types for the access register

use chrono::NaiveDate;
use thiserror::Error;

/// A single failing input field, reported back to the form that submitted it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Main error type for register operations.
///
/// Every variant is local to the operation that produced it; none leaves the
/// store in a partially written state.
#[derive(Error, Debug)]
pub enum AccessError {
    #[error("Validation error: {}", join_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("Plate {0} is already registered")]
    DuplicatePlate(String),

    #[error("Invalid date range: {start} is after {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("No authorized lookup is pending confirmation")]
    NoAuthorizedLookup,

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Export error: {0}")]
    Export(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AccessError {
    /// Shorthand for a validation failure on one field
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        AccessError::Validation(vec![FieldError::new(field, message)])
    }

    /// Field errors carried by a validation failure, empty for other variants
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            AccessError::Validation(errors) => errors,
            _ => &[],
        }
    }
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for register operations
pub type AccessResult<T> = Result<T, AccessError>;
