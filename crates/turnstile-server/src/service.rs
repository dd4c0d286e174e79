//! User operations exposed to the handlers.
//!
//! Reads go through the [`CacheCoordinator`]; writes go to the store and
//! invalidate the affected key before returning, so a read issued after a
//! write returns never sees the pre-write cache entry.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use turnstile_core::{DomainError, LookupKey, NewUser, PhoneNumber, User, UserPatch};
use turnstile_store::{Page, StoreError, UserPage, UserStore};

use crate::cache::{CacheCoordinator, ReadError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Read(#[from] ReadError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

pub struct UserService {
    store: Arc<dyn UserStore>,
    coordinator: Arc<CacheCoordinator>,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>, coordinator: Arc<CacheCoordinator>) -> Self {
        Self { store, coordinator }
    }

    /// Cached lookup by phone number.
    pub async fn find(&self, phone: &PhoneNumber) -> ServiceResult<Arc<User>> {
        Ok(self.coordinator.read(&LookupKey::new(phone)).await?)
    }

    /// Registers a new user.
    ///
    /// Duplicates are checked against the store, never the cache, so a
    /// stale entry cannot hide an existing registration.
    pub async fn create(&self, new_user: NewUser) -> ServiceResult<User> {
        new_user.validate()?;

        match self.store.find_by_phone(&new_user.phone_number).await {
            Ok(_) => {
                return Err(StoreError::AlreadyExists(new_user.phone_number.to_string()).into());
            },
            Err(e) if e.is_not_found() => {},
            Err(e) => return Err(e.into()),
        }

        let user = self.store.insert(new_user).await?;
        // Clears a miss marker cached before the registration.
        self.coordinator.invalidate(&user.lookup_key()).await;

        info!(user_id = user.id, phone = %user.phone_number, "User created");
        Ok(user)
    }

    /// Updates status and validity of an existing user.
    pub async fn update(&self, phone: &PhoneNumber, patch: UserPatch) -> ServiceResult<User> {
        patch.validate()?;

        let mut user = self.store.find_by_phone(phone).await?;
        user.apply(patch)?;
        self.store.update(&user).await?;
        self.coordinator.invalidate(&user.lookup_key()).await;

        info!(user_id = user.id, phone = %phone, status = %user.status, "User updated");
        Ok(user)
    }

    pub async fn remove(&self, phone: &PhoneNumber) -> ServiceResult<()> {
        self.store.delete(phone).await?;
        self.coordinator.invalidate(&LookupKey::new(phone)).await;

        info!(phone = %phone, "User removed");
        Ok(())
    }

    /// One page of users, read from the store directly.
    pub async fn list(&self, page: Page) -> ServiceResult<UserPage> {
        Ok(self.store.list(page).await?)
    }

    pub async fn health_check(&self) -> ServiceResult<()> {
        Ok(self.store.health_check().await?)
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }
}
