//! ProjectHub Core - resilience and recovery for AI recommendations.
//!
//! This crate keeps the AI-backed recommendation feature available while its
//! downstream dependency is slow, rate-limited or down. It is
//! database-agnostic and defines traits that are implemented by the
//! `storage-sqlite` crate.
//!
//! - [`circuit_breaker`] - per-resource circuit breakers
//! - [`retry`] - retry-with-backoff delivery of notifications
//! - [`recovery`] - staged cache / fallback / degraded recovery
//! - [`cache`] - recommendation cache freshness and warm-up

pub mod cache;
pub mod circuit_breaker;
pub mod errors;
pub mod recovery;
pub mod retry;
pub mod settings;
pub mod utils;

pub use settings::ResilienceSettings;

// Re-export error types
pub use errors::Error;
pub use errors::ErrorCategory;
pub use errors::Result;
