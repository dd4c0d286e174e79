//! Cache metrics recording.

use metrics::{counter, gauge, histogram};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Registra las metricas de cache.
pub fn register_cache_metrics() {
    metrics::describe_counter!("turnstile_cache_hits_total", "Reads served from a cached user");
    metrics::describe_counter!(
        "turnstile_cache_negative_hits_total",
        "Reads answered not-found from a cached miss marker"
    );
    metrics::describe_counter!(
        "turnstile_cache_misses_total",
        "Reads that had to query the store"
    );
    metrics::describe_counter!(
        "turnstile_cache_store_errors_total",
        "Store lookups that failed with an infrastructure error"
    );
    metrics::describe_counter!(
        "turnstile_cache_invalidations_total",
        "Cache invalidations issued by write paths"
    );
    metrics::describe_counter!(
        "turnstile_cache_evictions_total",
        "Total number of cache evictions"
    );
    metrics::describe_counter!(
        "turnstile_coalesced_waiters_total",
        "Reads that joined an in-flight store lookup"
    );
    metrics::describe_gauge!("turnstile_cache_entries", "Current number of entries in cache");
    metrics::describe_histogram!(
        "turnstile_cache_operation_seconds",
        "Time spent on cache operations"
    );
}

/// Recorder de metricas de cache.
/// Usa atomic counters internos para consultar los totales sin exporter.
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
    hits: Arc<AtomicU64>,
    negative_hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        counter!("turnstile_cache_hits_total").increment(1);
    }

    /// Registra una lectura resuelta por un marcador negativo
    pub fn record_negative_hit(&self) {
        self.negative_hits.fetch_add(1, Ordering::Relaxed);
        counter!("turnstile_cache_negative_hits_total").increment(1);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!("turnstile_cache_misses_total").increment(1);
    }

    pub fn record_store_error(&self) {
        counter!("turnstile_cache_store_errors_total").increment(1);
    }

    /// Registra una invalidacion; `ok` es false si el backend fallo
    pub fn record_invalidation(&self, ok: bool) {
        let outcome = if ok { "ok" } else { "failed" };
        counter!("turnstile_cache_invalidations_total", "outcome" => outcome).increment(1);
    }

    pub fn record_eviction(&self, reason: &str) {
        counter!("turnstile_cache_evictions_total", "reason" => reason.to_string()).increment(1);
    }

    pub fn update_entry_count(&self, count: u64) {
        gauge!("turnstile_cache_entries").set(count as f64);
    }

    pub fn record_operation_duration(&self, operation: &str, duration: Duration) {
        histogram!(
            "turnstile_cache_operation_seconds",
            "operation" => operation.to_string()
        )
        .record(duration.as_secs_f64());
    }

    /// Fraccion de lecturas resueltas sin tocar el store (hits positivos y negativos).
    pub fn hit_rate(&self) -> f64 {
        let served = (self.hits() + self.negative_hits()) as f64;
        let total = served + self.misses() as f64;
        if total == 0.0 { 0.0 } else { served / total }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn negative_hits(&self) -> u64 {
        self.negative_hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
