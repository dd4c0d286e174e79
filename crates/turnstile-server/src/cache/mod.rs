//! Read-through caching of user lookups.
//!
//! - `backend`: the [`CacheStore`] contract and its Moka implementation
//! - `entry`: hit/miss entries with per-entry expiry
//! - `coalescer`: one in-flight lookup per key
//! - `coordinator`: cache, store and coalescer composed into `read`/`invalidate`

pub mod backend;
pub mod coalescer;
pub mod coordinator;
pub mod entry;

pub use backend::{CacheError, CacheStore, MokaCacheConfig, MokaCacheStore};
pub use coalescer::{CoalesceError, RequestCoalescer};
pub use coordinator::{CacheCoordinator, CachePolicy, PolicyError, ReadError};
pub use entry::{CacheEntry, EntryState};
