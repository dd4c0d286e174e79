//! Error types for the Turnstile domain.
//!
//! Domain errors are validation failures: they describe input that can never
//! become a valid user record, independent of any storage or transport.

use thiserror::Error;

/// Validation error raised while building domain values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Phone number is empty or not made of digits.
    #[error("invalid phone number '{value}': {reason}")]
    InvalidPhoneNumber {
        /// The raw value that was provided
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// Status code outside the known set.
    #[error("unknown user status: {0}")]
    InvalidStatus(i32),

    /// Validity window is missing.
    #[error("valid time cannot be empty")]
    EmptyValidTime,
}

impl DomainError {
    /// Creates an invalid phone number error.
    pub fn invalid_phone(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPhoneNumber {
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
