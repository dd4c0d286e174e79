//! Application state.

use std::sync::Arc;

use turnstile_store::UserStore;

use crate::cache::{CacheCoordinator, CachePolicy, CacheStore};
use crate::metrics::CacheMetrics;
use crate::service::UserService;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    users: Arc<UserService>,
    coordinator: Arc<CacheCoordinator>,
}

impl AppState {
    /// Wires the coordinator and the user service over one store and cache.
    pub fn new(store: Arc<dyn UserStore>, cache: Arc<dyn CacheStore>, policy: CachePolicy) -> Self {
        Self::with_metrics(store, cache, policy, CacheMetrics::new())
    }

    pub fn with_metrics(
        store: Arc<dyn UserStore>,
        cache: Arc<dyn CacheStore>,
        policy: CachePolicy,
        metrics: CacheMetrics,
    ) -> Self {
        let coordinator = Arc::new(CacheCoordinator::with_metrics(
            Arc::clone(&store),
            cache,
            policy,
            metrics,
        ));
        let users = Arc::new(UserService::new(store, Arc::clone(&coordinator)));

        Self { users, coordinator }
    }

    pub fn users(&self) -> &UserService {
        &self.users
    }

    pub fn coordinator(&self) -> &CacheCoordinator {
        &self.coordinator
    }
}
