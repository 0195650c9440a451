use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Why a circuit refused to run an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// The circuit is open and the recovery timeout has not elapsed.
    CoolingDown,
    /// The circuit is half-open and every trial slot is taken.
    HalfOpenSaturated,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CoolingDown => write!(f, "circuit is open"),
            Self::HalfOpenSaturated => write!(f, "half-open trial capacity reached"),
        }
    }
}

/// Returned instead of invoking the wrapped operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Circuit breaker rejected call to '{resource}': {reason}")]
pub struct CircuitOpenError {
    pub resource: String,
    pub reason: RejectionReason,
    /// When the next trial call will be admitted, if known.
    pub retry_at: Option<DateTime<Utc>>,
}

impl CircuitOpenError {
    pub fn cooling_down(resource: impl Into<String>, retry_at: Option<DateTime<Utc>>) -> Self {
        Self {
            resource: resource.into(),
            reason: RejectionReason::CoolingDown,
            retry_at,
        }
    }

    pub fn half_open_saturated(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            reason: RejectionReason::HalfOpenSaturated,
            retry_at: None,
        }
    }
}
