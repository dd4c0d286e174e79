//! # Turnstile Store
//!
//! The store of record for registered users.
//!
//! The server consumes storage only through the [`UserStore`] trait, so the
//! cache layer in front of it never depends on a concrete backend.
//! [`MemoryUserStore`] is the bundled implementation.
//!
//! ## Example
//!
//! ```
//! use turnstile_core::{NewUser, PhoneNumber, UserStatus};
//! use turnstile_store::{MemoryUserStore, UserStore};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = MemoryUserStore::new();
//! let phone = PhoneNumber::parse("13800138000").unwrap();
//!
//! store
//!     .insert(NewUser::new(phone.clone(), UserStatus::Normal, "2030-01-01"))
//!     .await
//!     .unwrap();
//!
//! let user = store.find_by_phone(&phone).await.unwrap();
//! assert_eq!(user.id, 1);
//! # }
//! ```

pub mod error;
pub mod memory;
pub mod traits;

// Re-exports
pub use error::StoreError;
pub use memory::MemoryUserStore;
pub use traits::{Page, UserPage, UserStore};

// Re-export turnstile_core for consumers
pub use turnstile_core;
