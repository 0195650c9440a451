use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::time_utils::duration_ms;

/// Default number of failures before opening the circuit.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default time to wait before admitting trial calls.
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of concurrent trial calls while half-open.
pub const DEFAULT_HALF_OPEN_MAX_CONCURRENT: u32 = 3;

/// Circuit breaker state.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - calls are allowed.
    #[default]
    Closed,
    /// Resource is failing - calls are rejected.
    Open,
    /// Testing recovery - a bounded number of calls are allowed.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// Time to wait in Open before admitting trial calls.
    #[serde(rename = "recoveryTimeoutMs", with = "duration_ms")]
    pub recovery_timeout: Duration,
    /// Maximum concurrent trial calls while HalfOpen.
    pub half_open_max_concurrent: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
            half_open_max_concurrent: DEFAULT_HALF_OPEN_MAX_CONCURRENT,
        }
    }
}

impl CircuitBreakerConfig {
    /// Raises zero thresholds to one so a circuit can always open and probe.
    pub fn normalized(mut self) -> Self {
        self.failure_threshold = self.failure_threshold.max(1);
        self.half_open_max_concurrent = self.half_open_max_concurrent.max(1);
        self
    }
}

/// Point-in-time snapshot of one circuit, suitable for admin dashboards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitStatus {
    pub resource: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub next_attempt_time: Option<DateTime<Utc>>,
    pub half_open_in_flight: u32,
}

impl CircuitStatus {
    /// Status reported for a resource that has never been called.
    pub fn closed(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_time: None,
            next_attempt_time: None,
            half_open_in_flight: 0,
        }
    }
}
