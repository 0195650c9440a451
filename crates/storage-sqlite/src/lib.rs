//! SQLite storage for the resilience core.
//!
//! This crate implements the persistence traits defined in `projecthub-core`
//! with Diesel over SQLite:
//! - Connection pooling, pragmas and embedded migrations
//! - A single-writer actor that serializes all writes
//! - The recommendation cache repository
//! - The retry attempt repository
//!
//! ```text
//!   projecthub-core (traits, services)
//!                  │
//!                  ▼
//!   storage-sqlite (this crate)
//!                  │
//!                  ▼
//!              SQLite DB
//! ```

pub mod db;
pub mod errors;
pub mod schema;
pub mod utils;

// Repository implementations
pub mod cache;
pub mod retry;

// Re-export database utilities
pub use db::{
    create_pool, get_connection, get_db_path, init, run_migrations, spawn_writer, DbConnection,
    DbPool, WriteHandle,
};

// Re-export storage errors and conversion helpers
pub use errors::StorageError;

pub use cache::RecommendationCacheRepository;
pub use retry::RetryAttemptRepository;

// Re-export from projecthub-core for convenience
pub use projecthub_core::errors::{DatabaseError, Error, Result};
