//! Error types for user stores.

/// Errors that can occur when talking to the store of record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No user matches the lookup.
    #[error("user not found: {0}")]
    NotFound(String),

    /// A user with the same identity already exists.
    #[error("user already exists: {0}")]
    AlreadyExists(String),

    /// The store cannot be reached.
    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },

    /// The operation did not finish in time.
    #[error("store operation timed out after {millis}ms")]
    Timeout { millis: u64 },

    /// The write violates a store constraint.
    #[error("constraint violation: {0}")]
    Constraint(String),
}

impl StoreError {
    /// Creates a not found error for the given identity.
    pub fn not_found(identity: impl Into<String>) -> Self {
        Self::NotFound(identity.into())
    }

    /// Creates a store unavailable error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Returns true if the lookup found nothing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if this is a transient error that might succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }
}
