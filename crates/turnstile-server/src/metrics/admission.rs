//! Admission control metrics.

use metrics::{counter, gauge};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub fn register_admission_metrics() {
    metrics::describe_counter!(
        "turnstile_admission_decisions_total",
        "Admission decisions by outcome"
    );
    metrics::describe_gauge!(
        "turnstile_admission_tokens",
        "Tokens left in the bucket after the last decision"
    );
}

/// Contadores de admision/rechazo.
#[derive(Debug, Clone, Default)]
pub struct AdmissionMetrics {
    admitted: Arc<AtomicU64>,
    rejected: Arc<AtomicU64>,
}

impl AdmissionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, admitted: bool, tokens_left: f64) {
        let outcome = if admitted {
            self.admitted.fetch_add(1, Ordering::Relaxed);
            "admitted"
        } else {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            "rejected"
        };
        counter!("turnstile_admission_decisions_total", "outcome" => outcome).increment(1);
        gauge!("turnstile_admission_tokens").set(tokens_left);
    }

    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}
