//! Retry attempt telemetry storage.
//!
//! Provides persistence for per-item delivery attempt records.

pub mod model;
pub mod repository;

pub use model::RetryAttemptDB;
pub use repository::RetryAttemptRepository;
