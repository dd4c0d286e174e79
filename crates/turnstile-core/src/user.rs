//! The user record and its write-side inputs.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};
use crate::types::{LookupKey, PhoneNumber, UserStatus};

/// A registered user.
///
/// Serializes in camelCase, the shape returned by the public API and stored
/// as cache payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Store-assigned identifier
    pub id: i64,
    /// Natural identity
    pub phone_number: PhoneNumber,
    /// Account status
    pub status: UserStatus,
    /// End of the validity window, as supplied by the operator
    pub valid_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl User {
    /// Builds the stored record for a new user.
    pub fn from_new(id: i64, new_user: NewUser) -> Self {
        Self {
            id,
            phone_number: new_user.phone_number,
            status: new_user.status,
            valid_time: new_user.valid_time,
            organization: None,
            client: None,
            organization_id: None,
            client_id: None,
        }
    }

    /// Returns the cache/store key of this user.
    pub fn lookup_key(&self) -> LookupKey {
        LookupKey::new(&self.phone_number)
    }

    /// Returns true if the user is allowed through.
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Normal
    }

    /// Applies a patch in place after validating it.
    pub fn apply(&mut self, patch: UserPatch) -> Result<()> {
        patch.validate()?;
        self.status = patch.status;
        self.valid_time = patch.valid_time;
        Ok(())
    }
}

/// Input for registering a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub phone_number: PhoneNumber,
    pub status: UserStatus,
    pub valid_time: String,
}

impl NewUser {
    /// Creates a new registration input.
    pub fn new(phone_number: PhoneNumber, status: UserStatus, valid_time: impl Into<String>) -> Self {
        Self {
            phone_number,
            status,
            valid_time: valid_time.into(),
        }
    }

    /// Checks invariants the type system does not cover.
    pub fn validate(&self) -> Result<()> {
        validate_valid_time(&self.valid_time)
    }
}

/// Mutable fields of an existing user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPatch {
    pub status: UserStatus,
    pub valid_time: String,
}

impl UserPatch {
    pub fn new(status: UserStatus, valid_time: impl Into<String>) -> Self {
        Self {
            status,
            valid_time: valid_time.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_valid_time(&self.valid_time)
    }
}

fn validate_valid_time(valid_time: &str) -> Result<()> {
    if valid_time.trim().is_empty() {
        return Err(DomainError::EmptyValidTime);
    }
    Ok(())
}
