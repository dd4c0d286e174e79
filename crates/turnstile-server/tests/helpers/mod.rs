//! Test helpers para turnstile-server.

#![allow(dead_code)]

pub mod client;
pub mod fixtures;

pub use client::{TestClient, TestResponse};
pub use fixtures::{CountingStore, FailingCache, TestApp};
