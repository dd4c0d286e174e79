//! Token-bucket admission control.

use std::time::Instant;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::metrics::AdmissionMetrics;

/// Invalid bucket parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdmissionError {
    #[error("bucket capacity must be at least 1")]
    ZeroCapacity,

    #[error("refill rate must be a positive number of tokens per second, got {0}")]
    InvalidRefillRate(f64),
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Bounds the rate of accepted requests.
///
/// The bucket starts full with `capacity` tokens and refills continuously at
/// `refill_per_sec`. Each admitted request consumes one token.
///
/// # Examples
///
/// ```
/// use turnstile_server::admission::AdmissionController;
///
/// let limiter = AdmissionController::new(2, 1.0).unwrap();
/// assert!(limiter.allow());
/// assert!(limiter.allow());
/// assert!(!limiter.allow());
/// ```
#[derive(Debug)]
pub struct AdmissionController {
    state: Mutex<BucketState>,
    capacity: u32,
    refill_per_sec: f64,
    metrics: AdmissionMetrics,
}

impl AdmissionController {
    pub fn new(capacity: u32, refill_per_sec: f64) -> Result<Self, AdmissionError> {
        Self::with_metrics(capacity, refill_per_sec, AdmissionMetrics::new())
    }

    pub fn with_metrics(
        capacity: u32,
        refill_per_sec: f64,
        metrics: AdmissionMetrics,
    ) -> Result<Self, AdmissionError> {
        if capacity == 0 {
            return Err(AdmissionError::ZeroCapacity);
        }
        if !refill_per_sec.is_finite() || refill_per_sec <= 0.0 {
            return Err(AdmissionError::InvalidRefillRate(refill_per_sec));
        }

        Ok(Self {
            state: Mutex::new(BucketState {
                tokens: f64::from(capacity),
                last_refill: Instant::now(),
            }),
            capacity,
            refill_per_sec,
            metrics,
        })
    }

    /// Takes one token if available.
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    /// Refill and check-and-decrement happen under one lock acquisition.
    fn allow_at(&self, now: Instant) -> bool {
        let (admitted, tokens_left) = {
            let mut state = self.state.lock();
            self.refill(&mut state, now);

            if state.tokens >= 1.0 {
                state.tokens -= 1.0;
                (true, state.tokens)
            } else {
                (false, state.tokens)
            }
        };

        self.metrics.record(admitted, tokens_left);
        if !admitted {
            debug!(tokens = tokens_left, "Admission rejected");
        }
        admitted
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        // Saturates to zero if `now` is behind `last_refill`.
        let elapsed = now.saturating_duration_since(state.last_refill);
        if elapsed.is_zero() {
            return;
        }
        let refilled = state.tokens + elapsed.as_secs_f64() * self.refill_per_sec;
        state.tokens = refilled.min(f64::from(self.capacity));
        state.last_refill = now;
    }

    /// Tokens currently in the bucket, refill included.
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock();
        self.refill(&mut state, Instant::now());
        state.tokens
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn refill_per_sec(&self) -> f64 {
        self.refill_per_sec
    }

    pub fn metrics(&self) -> &AdmissionMetrics {
        &self.metrics
    }
}
