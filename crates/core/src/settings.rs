//! Aggregate configuration for the resilience components.
//!
//! Every field has a default, so a host can load a partial JSON document:
//!
//! ```json
//! { "circuitBreaker": { "failureThreshold": 3 }, "retry": { "maxRetries": 5 } }
//! ```

use serde::{Deserialize, Serialize};

use crate::cache::{CacheFreshnessConfig, SchedulerConfig};
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::errors::{Result, ValidationError};
use crate::recovery::RecoveryOptions;
use crate::retry::RetryConfig;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResilienceSettings {
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryConfig,
    pub recovery: RecoveryOptions,
    pub cache: CacheFreshnessConfig,
    pub scheduler: SchedulerConfig,
}

impl ResilienceSettings {
    /// Parse and validate settings from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| -> Result<()> {
            Err(ValidationError::InvalidInput(msg.to_string()).into())
        };

        if self.circuit_breaker.failure_threshold == 0 {
            return invalid("circuitBreaker.failureThreshold must be at least 1");
        }
        if self.circuit_breaker.half_open_max_concurrent == 0 {
            return invalid("circuitBreaker.halfOpenMaxConcurrent must be at least 1");
        }
        if self.retry.max_retries == 0 {
            return invalid("retry.maxRetries must be at least 1");
        }
        let multiplier = self.retry.backoff_multiplier;
        if multiplier.is_nan() || multiplier < 1.0 || multiplier.is_infinite() {
            return invalid("retry.backoffMultiplier must be a finite number >= 1");
        }
        if self.retry.base_delay > self.retry.max_delay {
            return invalid("retry.baseDelayMs must not exceed retry.maxDelayMs");
        }
        if self.cache.batch_size == 0 {
            return invalid("cache.batchSize must be at least 1");
        }
        if self.cache.freshness_window.is_zero() {
            return invalid("cache.freshnessWindowMs must be positive");
        }
        if self.scheduler.enabled && self.scheduler.interval.is_zero() {
            return invalid("scheduler.intervalMs must be positive");
        }
        Ok(())
    }
}
