//! Shared primitives for all Rust crates in slotgate.

#![forbid(unsafe_code)]

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across slotgate crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for NonEmptyString {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Transient network or coordination API failure that may succeed on retry.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// No slot became free before the configured wait elapsed.
    #[error("acquisition timeout: {0}")]
    AcquisitionTimeout(String),

    /// Shared capacity cannot absorb one more cluster and strict admission is enabled.
    #[error("capacity insufficient: {0}")]
    CapacityInsufficient(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns true when the failure is worth retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::{AppError, NonEmptyString};

    #[test]
    fn non_empty_string_rejects_whitespace() {
        let result = NonEmptyString::new("   ");
        assert!(result.is_err());
    }

    #[test]
    fn non_empty_string_displays_inner_value() {
        let value = NonEmptyString::new("run-42").unwrap_or_else(|_| unreachable!());
        assert_eq!(value.to_string(), "run-42");
    }

    #[test]
    fn only_unavailable_is_transient() {
        assert!(AppError::Unavailable("timeout".to_owned()).is_transient());
        assert!(!AppError::Conflict("held".to_owned()).is_transient());
        assert!(!AppError::AcquisitionTimeout("waited".to_owned()).is_transient());
    }
}
