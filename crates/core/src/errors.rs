//! Core error types for the ProjectHub resilience layer.
//!
//! This module defines database-agnostic error types. Storage-specific errors
//! (from Diesel, SQLite, etc.) are converted to these types by the storage layer.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::circuit_breaker::CircuitOpenError;
use crate::retry::{DeliveryError, RetryExhaustedError};

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the resilience core.
///
/// Every wrapped operation, collaborator and service returns this type so that
/// callers can pattern-match on the resilience variants directly.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    CircuitOpen(#[from] CircuitOpenError),

    #[error("{0}")]
    RetryExhausted(#[from] RetryExhaustedError),

    #[error("{0}")]
    Delivery(#[from] DeliveryError),

    #[error("AI service call failed: {0}")]
    Service(#[from] ServiceError),

    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Input validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// Classifies this error for recovery and user messaging.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::CircuitOpen(_) => ErrorCategory::CircuitOpen,
            Error::Service(service) => service.category(),
            _ => ErrorCategory::Unknown,
        }
    }
}

/// Failures reported by the AI dependency that the core knows how to classify.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The dependency is down or refusing connections.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// The dependency throttled the request.
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_secs: Option<u64>,
    },

    /// The call exceeded its own deadline.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Any other provider failure (bad response, invalid request, ...).
    #[error("Provider error: {0}")]
    Provider(String),
}

impl ServiceError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ServiceError::Unavailable(_) => ErrorCategory::ServiceUnavailable,
            ServiceError::RateLimited { .. } => ErrorCategory::RateLimited,
            ServiceError::Timeout(_) => ErrorCategory::Timeout,
            ServiceError::Provider(_) => ErrorCategory::Unknown,
        }
    }
}

/// Coarse error classification used by the recovery orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    ServiceUnavailable,
    RateLimited,
    CircuitOpen,
    Timeout,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::ServiceUnavailable => "service_unavailable",
            ErrorCategory::RateLimited => "rate_limited",
            ErrorCategory::CircuitOpen => "circuit_open",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Unknown => "unknown",
        }
    }

    /// Only the transient dependency failures are worth recovering from.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ErrorCategory::Unknown)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Database-agnostic error type for storage operations.
///
/// This enum uses `String` for all error details, allowing the storage layer
/// to convert storage-specific errors (Diesel, SQLite, etc.) into this format.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish a database connection.
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to create or configure the connection pool.
    #[error("Failed to create database pool: {0}")]
    PoolCreationFailed(String),

    /// A database query failed to execute.
    #[error("Database query failed: {0}")]
    QueryFailed(String),

    /// The requested record was not found.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A database transaction failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Database migration failed.
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Internal/unexpected database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

/// Validation errors for configuration and input parsing.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Validation(ValidationError::JsonParse(err))
    }
}
