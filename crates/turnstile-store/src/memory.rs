//! In-memory user store.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;
use turnstile_core::{NewUser, PhoneNumber, User};

use crate::error::StoreError;
use crate::traits::{Page, UserPage, UserStore};

#[derive(Debug, Default)]
struct Tables {
    /// Users keyed by id, so listing comes out in id order.
    by_id: BTreeMap<i64, User>,
    /// Unique index on the natural identity.
    by_phone: HashMap<PhoneNumber, i64>,
}

/// Store of record kept in process memory.
///
/// Both tables are updated under one write lock, so every call is atomic.
#[derive(Debug)]
pub struct MemoryUserStore {
    tables: RwLock<Tables>,
    next_id: AtomicI64,
}

impl MemoryUserStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Returns the number of stored users.
    pub fn len(&self) -> usize {
        self.tables.read().by_id.len()
    }

    /// Returns true if no user is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_phone(&self, phone: &PhoneNumber) -> Result<User, StoreError> {
        let tables = self.tables.read();
        tables
            .by_phone
            .get(phone)
            .and_then(|id| tables.by_id.get(id))
            .cloned()
            .ok_or_else(|| StoreError::not_found(phone.as_str()))
    }

    async fn find_by_id(&self, id: i64) -> Result<User, StoreError> {
        self.tables
            .read()
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("id {id}")))
    }

    async fn insert(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables.write();

        if tables.by_phone.contains_key(&new_user.phone_number) {
            return Err(StoreError::AlreadyExists(
                new_user.phone_number.to_string(),
            ));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let user = User::from_new(id, new_user);

        tables.by_phone.insert(user.phone_number.clone(), id);
        tables.by_id.insert(id, user.clone());

        debug!(id, phone = %user.phone_number, "User inserted");
        Ok(user)
    }

    async fn update(&self, user: &User) -> Result<(), StoreError> {
        let mut tables = self.tables.write();

        let previous_phone = match tables.by_id.get(&user.id) {
            Some(existing) => existing.phone_number.clone(),
            None => return Err(StoreError::not_found(format!("id {}", user.id))),
        };

        if previous_phone != user.phone_number {
            if tables.by_phone.contains_key(&user.phone_number) {
                return Err(StoreError::Constraint(format!(
                    "phone number {} already belongs to another user",
                    user.phone_number
                )));
            }
            tables.by_phone.remove(&previous_phone);
            tables.by_phone.insert(user.phone_number.clone(), user.id);
        }

        tables.by_id.insert(user.id, user.clone());

        debug!(id = user.id, "User updated");
        Ok(())
    }

    async fn delete(&self, phone: &PhoneNumber) -> Result<(), StoreError> {
        let mut tables = self.tables.write();

        let id = tables
            .by_phone
            .remove(phone)
            .ok_or_else(|| StoreError::not_found(phone.as_str()))?;
        tables.by_id.remove(&id);

        debug!(id, phone = %phone, "User deleted");
        Ok(())
    }

    async fn list(&self, page: Page) -> Result<UserPage, StoreError> {
        let tables = self.tables.read();

        let users = tables
            .by_id
            .values()
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect();

        Ok(UserPage {
            users,
            total: tables.by_id.len(),
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}
