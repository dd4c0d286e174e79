//! Turnstile Core - Domain types
//!
//! This crate provides the foundational types shared by the store and the
//! HTTP server: normalized phone numbers, the cache lookup key derived from
//! them, and the user record itself.
//!
//! # Example
//!
//! ```
//! use turnstile_core::{LookupKey, PhoneNumber};
//!
//! let phone = PhoneNumber::parse(" 138-0000-0000 ").unwrap();
//! let key = LookupKey::new(&phone);
//! assert_eq!(key.to_string(), "user:phone:13800000000");
//! ```

pub mod error;
pub mod types;
pub mod user;

pub use error::{DomainError, Result};
pub use types::{LookupKey, PhoneNumber, UserStatus};
pub use user::{NewUser, User, UserPatch};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
