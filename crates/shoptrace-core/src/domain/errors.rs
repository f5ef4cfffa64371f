//! Domain error types
//!
//! Errors raised while parsing or validating telemetry domain values.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Unknown severity name
    #[error("Invalid severity: {0}")]
    InvalidSeverity(String),

    /// Unknown category name
    #[error("Invalid category: {0}")]
    InvalidCategory(String),

    /// A log entry identifier that does not follow the `err_<millis>_<suffix>` shape
    #[error("Invalid entry ID: {0}")]
    InvalidEntryId(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::InvalidSeverity("fatal".to_string());
        assert_eq!(err.to_string(), "Invalid severity: fatal");

        let err = DomainError::InvalidCategory("db".to_string());
        assert_eq!(err.to_string(), "Invalid category: db");

        let err = DomainError::InvalidEntryId("abc".to_string());
        assert_eq!(err.to_string(), "Invalid entry ID: abc");
    }

    #[test]
    fn test_error_equality() {
        let err1 = DomainError::InvalidSeverity("x".to_string());
        let err2 = DomainError::InvalidSeverity("x".to_string());
        let err3 = DomainError::InvalidCategory("x".to_string());

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }
}
