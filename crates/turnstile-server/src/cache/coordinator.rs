//! Read-through cache in front of the user store.
//!
//! Reads go cache → store with stampede protection (one store lookup per key
//! at a time) and negative caching (a short-lived miss marker for identities
//! the store does not know). Writes bypass this path and call
//! [`CacheCoordinator::invalidate`] once the store has accepted them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, warn};
use turnstile_core::{LookupKey, User};
use turnstile_store::{StoreError, UserStore};

use crate::cache::backend::CacheStore;
use crate::cache::coalescer::{CoalesceError, RequestCoalescer};
use crate::cache::entry::EntryState;
use crate::metrics::CacheMetrics;

/// Outcome of a failed read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    /// The store has no user for this key (possibly answered from a miss marker).
    #[error("user not found: {0}")]
    NotFound(String),

    /// The store lookup failed; nothing was cached.
    #[error("user lookup failed: {0}")]
    Internal(String),

    /// The coalesced lookup this read joined did not complete.
    #[error(transparent)]
    Coalesced(#[from] CoalesceError),
}

/// Invalid TTL combination.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("cache TTLs must be greater than zero")]
    ZeroTtl,

    #[error("negative TTL ({negative:?}) must be shorter than positive TTL ({positive:?})")]
    NegativeNotShorter {
        negative: Duration,
        positive: Duration,
    },
}

/// How long reads stay cached and how long a store lookup may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    positive_ttl: Duration,
    negative_ttl: Duration,
    store_timeout: Duration,
}

impl CachePolicy {
    /// Default store lookup deadline.
    pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

    /// Builds a policy, rejecting a negative TTL that is not strictly
    /// shorter than the positive one.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use turnstile_server::cache::CachePolicy;
    ///
    /// assert!(CachePolicy::new(Duration::from_secs(600), Duration::from_secs(60)).is_ok());
    /// assert!(CachePolicy::new(Duration::from_secs(60), Duration::from_secs(60)).is_err());
    /// ```
    pub fn new(positive_ttl: Duration, negative_ttl: Duration) -> Result<Self, PolicyError> {
        if positive_ttl.is_zero() || negative_ttl.is_zero() {
            return Err(PolicyError::ZeroTtl);
        }
        if negative_ttl >= positive_ttl {
            return Err(PolicyError::NegativeNotShorter {
                negative: negative_ttl,
                positive: positive_ttl,
            });
        }

        Ok(Self {
            positive_ttl,
            negative_ttl,
            store_timeout: Self::DEFAULT_STORE_TIMEOUT,
        })
    }

    /// Sets the deadline applied to each store lookup.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn positive_ttl(&self) -> Duration {
        self.positive_ttl
    }

    pub fn negative_ttl(&self) -> Duration {
        self.negative_ttl
    }

    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }
}

impl Default for CachePolicy {
    /// 10 minutes for users, 60 seconds for miss markers.
    fn default() -> Self {
        Self {
            positive_ttl: Duration::from_secs(600),
            negative_ttl: Duration::from_secs(60),
            store_timeout: Self::DEFAULT_STORE_TIMEOUT,
        }
    }
}

/// Composes cache, store and coalescer into a single read operation.
pub struct CacheCoordinator {
    store: Arc<dyn UserStore>,
    cache: Arc<dyn CacheStore>,
    coalescer: RequestCoalescer<LookupKey, Result<Arc<User>, ReadError>>,
    policy: CachePolicy,
    metrics: CacheMetrics,
    /// Bumped by every invalidation. A lookup that overlaps one must not
    /// leave its result in the cache.
    invalidations: AtomicU64,
}

impl CacheCoordinator {
    pub fn new(store: Arc<dyn UserStore>, cache: Arc<dyn CacheStore>, policy: CachePolicy) -> Self {
        Self::with_metrics(store, cache, policy, CacheMetrics::new())
    }

    pub fn with_metrics(
        store: Arc<dyn UserStore>,
        cache: Arc<dyn CacheStore>,
        policy: CachePolicy,
        metrics: CacheMetrics,
    ) -> Self {
        Self {
            store,
            cache,
            coalescer: RequestCoalescer::new(),
            policy,
            metrics,
            invalidations: AtomicU64::new(0),
        }
    }

    /// Reads the user for `key`.
    ///
    /// Concurrent reads of the same key share one lookup and all get its
    /// outcome. Store failures are returned as [`ReadError::Internal`] and
    /// never cached.
    pub async fn read(&self, key: &LookupKey) -> Result<Arc<User>, ReadError> {
        self.coalescer
            .execute(key.clone(), move || self.load(key))
            .await?
    }

    /// Drops any cached entry for `key`, hit or miss, and detaches a lookup
    /// still running for it so later reads go back to the store.
    ///
    /// Failures are logged and swallowed: the store write has already
    /// happened and the entry expires on its own.
    pub async fn invalidate(&self, key: &LookupKey) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        match self.cache.delete(key).await {
            Ok(()) => {
                self.metrics.record_invalidation(true);
                debug!(key = %key, "Cache entry invalidated");
            },
            Err(e) => {
                self.metrics.record_invalidation(false);
                warn!(key = %key, error = %e, "Cache invalidation failed; entry will expire on TTL");
            },
        }

        if self.coalescer.forget(key) {
            debug!(key = %key, "Detached in-flight lookup");
        }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Number of keys with a store lookup currently running.
    pub fn in_flight(&self) -> usize {
        self.coalescer.in_flight()
    }

    /// Cuerpo de la lectura; corre una sola vez por grupo de lecturas coalescidas.
    async fn load(&self, key: &LookupKey) -> Result<Arc<User>, ReadError> {
        // Re-check: a previous leader may have filled the entry while we queued.
        match self.cache.get(key).await {
            Ok(Some(entry)) if !entry.is_expired() => match entry.state {
                EntryState::Hit(payload) => match serde_json::from_slice::<User>(&payload) {
                    Ok(user) => {
                        self.metrics.record_hit();
                        return Ok(Arc::new(user));
                    },
                    Err(e) => {
                        warn!(key = %key, error = %e, "Undecodable cache payload, refetching");
                    },
                },
                EntryState::Miss => {
                    self.metrics.record_negative_hit();
                    return Err(ReadError::NotFound(key.to_string()));
                },
            },
            Ok(_) => {},
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, falling through to store");
            },
        }

        self.metrics.record_miss();
        let epoch = self.invalidations.load(Ordering::SeqCst);
        let start = Instant::now();

        let lookup = tokio::time::timeout(
            self.policy.store_timeout,
            self.store.find_by_phone(key.phone()),
        )
        .await
        .unwrap_or_else(|_| {
            Err(StoreError::Timeout {
                millis: self.policy.store_timeout.as_millis() as u64,
            })
        });

        self.metrics
            .record_operation_duration("store_lookup", start.elapsed());

        match lookup {
            Ok(user) => {
                match serde_json::to_vec(&user) {
                    Ok(bytes) => {
                        self.fill(key, EntryState::Hit(bytes.into()), self.policy.positive_ttl, epoch)
                            .await;
                    },
                    Err(e) => warn!(key = %key, error = %e, "Failed to encode user for cache"),
                }
                Ok(Arc::new(user))
            },
            Err(e) if e.is_not_found() => {
                self.fill(key, EntryState::Miss, self.policy.negative_ttl, epoch)
                    .await;
                Err(ReadError::NotFound(key.to_string()))
            },
            Err(e) => {
                self.metrics.record_store_error();
                error!(key = %key, error = %e, transient = e.is_transient(), "Store lookup failed");
                Err(ReadError::Internal(e.to_string()))
            },
        }
    }

    /// Best-effort cache write of a lookup result.
    ///
    /// Skipped when an invalidation started after `epoch`; if one lands
    /// between the check and the write, the entry is removed again.
    async fn fill(&self, key: &LookupKey, state: EntryState, ttl: Duration, epoch: u64) {
        if self.invalidations.load(Ordering::SeqCst) != epoch {
            debug!(key = %key, "Lookup overlapped a write, not caching");
            return;
        }

        let miss = matches!(state, EntryState::Miss);
        if let Err(e) = self.cache.set_with_ttl(key, state, ttl).await {
            warn!(key = %key, error = %e, "Failed to cache lookup result");
            return;
        }

        if self.invalidations.load(Ordering::SeqCst) != epoch {
            if let Err(e) = self.cache.delete(key).await {
                warn!(key = %key, error = %e, "Failed to drop overlapped cache entry");
            }
            return;
        }

        if miss {
            debug!(key = %key, ttl_secs = ttl.as_secs(), "Cached miss marker");
        }
    }
}
