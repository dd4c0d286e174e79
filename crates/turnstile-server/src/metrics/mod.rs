//! Metrics module for the Turnstile server.

pub mod admission;
pub mod cache;
pub mod http;
pub mod setup;

pub use admission::AdmissionMetrics;
pub use cache::CacheMetrics;
pub use setup::{init_metrics, register_metrics};
