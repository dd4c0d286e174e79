//! Cache backend contract and its Moka implementation.

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use std::time::{Duration, Instant};
use thiserror::Error;
use turnstile_core::LookupKey;

use crate::cache::entry::{CacheEntry, EntryState};
use crate::metrics::CacheMetrics;

/// Error del backend de cache.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Key/value cache with per-entry TTL.
///
/// No compare-and-swap is offered; concurrent writers are kept apart by the
/// request coalescer, not by the backend.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the live entry for `key`, if any.
    async fn get(&self, key: &LookupKey) -> Result<Option<CacheEntry>, CacheError>;

    /// Stores `state` under `key` for `ttl`.
    async fn set_with_ttl(
        &self,
        key: &LookupKey,
        state: EntryState,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Removes any entry for `key`, hit or miss.
    async fn delete(&self, key: &LookupKey) -> Result<(), CacheError>;
}

/// Configuracion del cache en memoria.
#[derive(Debug, Clone)]
pub struct MokaCacheConfig {
    /// Maximo numero de entries (default: 10000)
    pub max_capacity: u64,
}

impl Default for MokaCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
        }
    }
}

/// Expira cada entry en su propio `expires_at`.
struct EntryExpiry;

impl Expiry<LookupKey, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &LookupKey,
        value: &CacheEntry,
        created_at: Instant,
    ) -> Option<Duration> {
        Some(value.remaining_ttl(created_at))
    }

    fn expire_after_update(
        &self,
        _key: &LookupKey,
        value: &CacheEntry,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.remaining_ttl(updated_at))
    }
}

/// In-process cache backend built on Moka.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use turnstile_core::{LookupKey, PhoneNumber};
/// use turnstile_server::cache::{CacheStore, EntryState, MokaCacheConfig, MokaCacheStore};
///
/// # #[tokio::main]
/// # async fn main() {
/// let cache = MokaCacheStore::new(MokaCacheConfig::default());
/// let key = LookupKey::new(&PhoneNumber::parse("13800138000").unwrap());
///
/// cache.set_with_ttl(&key, EntryState::Miss, Duration::from_secs(60)).await.unwrap();
/// assert!(cache.get(&key).await.unwrap().unwrap().is_miss());
/// # }
/// ```
#[derive(Clone)]
pub struct MokaCacheStore {
    inner: Cache<LookupKey, CacheEntry>,
    metrics: CacheMetrics,
}

impl MokaCacheStore {
    /// Crea un nuevo cache con la configuracion dada.
    pub fn new(config: MokaCacheConfig) -> Self {
        Self::with_metrics(config, CacheMetrics::new())
    }

    /// Crea el cache compartiendo un recorder de metricas existente.
    pub fn with_metrics(config: MokaCacheConfig, metrics: CacheMetrics) -> Self {
        let eviction_metrics = metrics.clone();

        let inner = Cache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(EntryExpiry)
            .eviction_listener(move |_key, _value, cause| {
                let reason = match cause {
                    moka::notification::RemovalCause::Expired => "ttl",
                    moka::notification::RemovalCause::Size => "capacity",
                    moka::notification::RemovalCause::Explicit => "invalidated",
                    moka::notification::RemovalCause::Replaced => "replaced",
                };
                eviction_metrics.record_eviction(reason);
            })
            .build();

        Self { inner, metrics }
    }

    /// Retorna el numero aproximado de entries en cache.
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    /// Fuerza la limpieza de entries expiradas.
    pub async fn sync(&self) {
        self.inner.run_pending_tasks().await;
        self.metrics.update_entry_count(self.inner.entry_count());
    }
}

#[async_trait]
impl CacheStore for MokaCacheStore {
    async fn get(&self, key: &LookupKey) -> Result<Option<CacheEntry>, CacheError> {
        let start = Instant::now();
        // Moka expira de forma perezosa; nunca devolver una entry vencida.
        let entry = self.inner.get(key).await.filter(|e| !e.is_expired());
        self.metrics
            .record_operation_duration("get", start.elapsed());
        Ok(entry)
    }

    async fn set_with_ttl(
        &self,
        key: &LookupKey,
        state: EntryState,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry::new(state, ttl, Instant::now());
        self.inner.insert(key.clone(), entry).await;
        self.metrics.update_entry_count(self.inner.entry_count());
        Ok(())
    }

    async fn delete(&self, key: &LookupKey) -> Result<(), CacheError> {
        self.inner.invalidate(key).await;
        Ok(())
    }
}
