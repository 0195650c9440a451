//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use super::model::RetryConfig;

/// Upper bound (exclusive) of the multiplicative jitter.
pub const MAX_JITTER: f64 = 0.1;

/// Draw a jitter factor uniformly from `[0, MAX_JITTER)`.
pub fn random_jitter() -> f64 {
    rand::thread_rng().gen_range(0.0..MAX_JITTER)
}

/// Delay to wait after failed attempt `attempt` (1-based).
///
/// `min(max_delay, base_delay * multiplier^(attempt - 1) * (1 + jitter))`
pub fn backoff_delay(attempt: u32, config: &RetryConfig, jitter: f64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
    let base_ms = config.base_delay.as_secs_f64() * 1000.0;
    let max_ms = config.max_delay.as_secs_f64() * 1000.0;

    let delay_ms = base_ms * config.backoff_multiplier.powi(exponent) * (1.0 + jitter);
    let capped_ms = if delay_ms.is_finite() {
        delay_ms.min(max_ms)
    } else {
        max_ms
    };

    Duration::from_secs_f64(capped_ms.max(0.0) / 1000.0)
}
