//! User store trait definition.

use async_trait::async_trait;
use turnstile_core::{NewUser, PhoneNumber, User};

use crate::error::StoreError;

const DEFAULT_PAGE_SIZE: usize = 10;
const MAX_PAGE_SIZE: usize = 100;

/// The store of record for users.
///
/// Each call is atomic on its own; callers never group several writes into
/// a transaction.
///
/// # Errors
///
/// - `StoreError::NotFound` when the addressed user does not exist
/// - `StoreError::AlreadyExists` when inserting a duplicate identity
/// - `StoreError::Unavailable` / `StoreError::Timeout` on infrastructure failures
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Looks up a user by its natural identity.
    async fn find_by_phone(&self, phone: &PhoneNumber) -> Result<User, StoreError>;

    /// Looks up a user by store id.
    async fn find_by_id(&self, id: i64) -> Result<User, StoreError>;

    /// Inserts a new user and returns the stored record.
    async fn insert(&self, user: NewUser) -> Result<User, StoreError>;

    /// Replaces the stored record with the same id.
    async fn update(&self, user: &User) -> Result<(), StoreError>;

    /// Deletes the user with the given phone number.
    async fn delete(&self, phone: &PhoneNumber) -> Result<(), StoreError>;

    /// Returns one page of users ordered by id, plus the total count.
    async fn list(&self, page: Page) -> Result<UserPage, StoreError>;

    /// Verifies that the store is reachable.
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Returns the name of this store, for logging.
    fn name(&self) -> &str;
}

/// Paging window over the user table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Maximum number of rows returned
    pub limit: usize,
    /// Rows skipped before the first returned one
    pub offset: usize,
}

impl Page {
    /// Builds a window from 1-based page coordinates.
    ///
    /// Page numbers below 1 are treated as 1; a page size of 0 falls back to
    /// the default and larger sizes are capped.
    ///
    /// # Example
    ///
    /// ```
    /// use turnstile_store::Page;
    ///
    /// let page = Page::new(3, 20);
    /// assert_eq!(page.offset, 40);
    /// assert_eq!(page.limit, 20);
    /// ```
    pub fn new(page: usize, page_size: usize) -> Self {
        let limit = match page_size {
            0 => DEFAULT_PAGE_SIZE,
            n => n.min(MAX_PAGE_SIZE),
        };
        let page = page.max(1);

        Self {
            limit,
            offset: (page - 1) * limit,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

/// One page of users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPage {
    pub users: Vec<User>,
    /// Number of users in the whole store
    pub total: usize,
}
