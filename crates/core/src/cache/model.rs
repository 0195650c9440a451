use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{Result, ValidationError};
use crate::utils::time_utils::{add_duration, duration_ms};

/// Default lifetime of a computed recommendation payload.
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Default age after which an unexpired entry is refreshed proactively.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(6 * 60 * 60);

pub const DEFAULT_BATCH_SIZE: usize = 10;

pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(1000);

/// A computed recommendation payload for one subject.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub subject_id: String,
    pub payload: Value,
    pub computed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(rename = "freshnessWindowMs", with = "duration_ms")]
    pub freshness_window: Duration,
    /// Set in bulk by expiry cleanup.
    pub is_expired: bool,
}

impl CacheEntry {
    /// Builds an entry expiring `freshness_window` after `computed_at`.
    ///
    /// A zero window would produce an entry that is born expired and is
    /// rejected.
    pub fn new(
        subject_id: impl Into<String>,
        payload: Value,
        computed_at: DateTime<Utc>,
        freshness_window: Duration,
    ) -> Result<Self> {
        let subject_id = subject_id.into();
        if freshness_window.is_zero() {
            return Err(ValidationError::InvalidInput(format!(
                "Freshness window for '{}' must be positive",
                subject_id
            ))
            .into());
        }

        Ok(Self {
            subject_id,
            payload,
            computed_at,
            expires_at: add_duration(computed_at, freshness_window),
            freshness_window,
            is_expired: false,
        })
    }

    /// True while the entry is neither flagged nor past its expiry time.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired && now < self.expires_at
    }

    pub fn age_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.computed_at)
    }
}

/// Tuning for the freshness manager and its batch refreshes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheFreshnessConfig {
    #[serde(rename = "freshnessWindowMs", with = "duration_ms")]
    pub freshness_window: Duration,
    #[serde(rename = "staleAfterMs", with = "duration_ms")]
    pub stale_after: Duration,
    pub batch_size: usize,
    #[serde(rename = "batchDelayMs", with = "duration_ms")]
    pub batch_delay: Duration,
}

impl Default for CacheFreshnessConfig {
    fn default() -> Self {
        Self {
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
            stale_after: DEFAULT_STALE_AFTER,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
        }
    }
}

/// Point-in-time cache health snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub is_refresh_running: bool,
    pub stale_count: u64,
    pub active_subject_count: u64,
    pub total_count: u64,
    pub expired_count: u64,
}

/// Outcome of a batch refresh.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSummary {
    pub total_subjects: usize,
    pub refreshed_count: usize,
    pub error_count: usize,
}

/// Outcome of a warm-up pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmUpSummary {
    pub active_subjects: usize,
    /// Active subjects that already held a fresh entry.
    pub already_fresh: usize,
    pub refreshed_count: usize,
    pub error_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_expires_after_window() {
        let computed_at = Utc::now();
        let entry = CacheEntry::new(
            "s1",
            json!([{"id": "p-1"}]),
            computed_at,
            Duration::from_secs(3600),
        )
        .unwrap();

        assert!(entry.expires_at > entry.computed_at);
        assert_eq!((entry.expires_at - computed_at).num_seconds(), 3600);
        assert!(entry.is_fresh_at(computed_at));
        assert!(!entry.is_fresh_at(entry.expires_at));
    }

    #[test]
    fn test_zero_window_rejected() {
        let result = CacheEntry::new("s1", json!([]), Utc::now(), Duration::ZERO);
        assert!(result.is_err());
    }

    #[test]
    fn test_flagged_entry_is_not_fresh() {
        let now = Utc::now();
        let mut entry =
            CacheEntry::new("s1", json!([]), now, Duration::from_secs(60)).unwrap();
        entry.is_expired = true;
        assert!(!entry.is_fresh_at(now));
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: CacheFreshnessConfig =
            serde_json::from_str(r#"{"batchSize": 25, "batchDelayMs": 250}"#).unwrap();
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.batch_delay, Duration::from_millis(250));
        assert_eq!(config.stale_after, DEFAULT_STALE_AFTER);
        assert_eq!(config.freshness_window, DEFAULT_FRESHNESS_WINDOW);
    }
}
