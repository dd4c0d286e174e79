//! Identity newtypes for the user registry.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DomainError, Result};

const MIN_DIGITS: usize = 5;
const MAX_DIGITS: usize = 20;

/// Normalized phone number, the natural identity of a user.
///
/// Spaces and dashes are stripped and a single leading `+` is kept, so the
/// same subscriber always normalizes to the same value.
///
/// # Example
///
/// ```
/// use turnstile_core::PhoneNumber;
///
/// let phone = PhoneNumber::parse("+86 138-0013-8000").unwrap();
/// assert_eq!(phone.as_str(), "+8613800138000");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Parses and normalizes a raw phone number.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_phone(raw, "cannot be empty"));
        }

        let (plus, rest) = match trimmed.strip_prefix('+') {
            Some(rest) => ("+", rest),
            None => ("", trimmed),
        };

        let digits: String = rest.chars().filter(|c| *c != ' ' && *c != '-').collect();

        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(DomainError::invalid_phone(raw, "must contain only digits"));
        }
        if !(MIN_DIGITS..=MAX_DIGITS).contains(&digits.len()) {
            return Err(DomainError::invalid_phone(
                raw,
                format!("must have between {MIN_DIGITS} and {MAX_DIGITS} digits"),
            ));
        }

        Ok(Self(format!("{plus}{digits}")))
    }

    /// Returns the normalized number.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for PhoneNumber {
    type Error = DomainError;

    fn try_from(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<PhoneNumber> for String {
    fn from(phone: PhoneNumber) -> Self {
        phone.0
    }
}

/// Key addressing a user in both the cache and the store.
///
/// Derived only from a normalized [`PhoneNumber`], so it is stable for a
/// given identity and distinct identities never share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupKey {
    phone: PhoneNumber,
}

impl LookupKey {
    /// Namespace prefix shared by every user key.
    pub const PREFIX: &'static str = "user:phone:";

    /// Builds the key for a phone number.
    ///
    /// # Example
    ///
    /// ```
    /// use turnstile_core::{LookupKey, PhoneNumber};
    ///
    /// let key = LookupKey::new(&PhoneNumber::parse("13800000000").unwrap());
    /// assert_eq!(key.phone().as_str(), "13800000000");
    /// ```
    pub fn new(phone: &PhoneNumber) -> Self {
        Self {
            phone: phone.clone(),
        }
    }

    /// Returns the identity this key was derived from.
    pub fn phone(&self) -> &PhoneNumber {
        &self.phone
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.phone)
    }
}

impl From<&PhoneNumber> for LookupKey {
    fn from(phone: &PhoneNumber) -> Self {
        Self::new(phone)
    }
}

/// Account status of a registered user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum UserStatus {
    /// Access allowed.
    Normal,
    /// Access denied.
    Blocked,
}

impl UserStatus {
    /// Returns the wire code of this status.
    pub fn code(self) -> i32 {
        match self {
            Self::Normal => 1,
            Self::Blocked => 2,
        }
    }
}

impl TryFrom<i32> for UserStatus {
    type Error = DomainError;

    fn try_from(code: i32) -> Result<Self> {
        match code {
            1 => Ok(Self::Normal),
            2 => Ok(Self::Blocked),
            other => Err(DomainError::InvalidStatus(other)),
        }
    }
}

impl From<UserStatus> for i32 {
    fn from(status: UserStatus) -> Self {
        status.code()
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("normal"),
            Self::Blocked => f.write_str("blocked"),
        }
    }
}
