//! Turnstile Server - HTTP front of the user registry
//!
//! Requests pass the [`admission::AdmissionController`] first, then reach the
//! handlers, which read users through the cache coordinator and write them
//! through [`service::UserService`].

pub mod admission;
pub mod cache;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod server;
pub mod service;
pub mod settings;
pub mod state;

pub use admission::AdmissionController;
pub use error::AppError;
pub use server::{create_router_with_state, run_server};
pub use service::UserService;
pub use settings::Settings;
pub use state::AppState;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
