//! Cache entries with explicit hit/miss state.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// What a cache entry records about a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryState {
    /// The store returned a value; holds its encoded payload.
    Hit(Arc<[u8]>),
    /// Negative marker: the store was asked and had nothing.
    Miss,
}

/// Entrada del cache con su instante de expiracion.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub state: EntryState,
    pub expires_at: Instant,
}

impl CacheEntry {
    /// Crea una entrada que expira `ttl` despues de `now`.
    pub fn new(state: EntryState, ttl: Duration, now: Instant) -> Self {
        Self {
            state,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub fn is_miss(&self) -> bool {
        matches!(self.state, EntryState::Miss)
    }

    /// Tiempo de vida restante (cero si ya expiro).
    pub fn remaining_ttl(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}
