use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;
use crate::utils::time_utils::duration_ms;

/// Retry configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one.
    pub max_retries: u32,
    /// Delay before the second attempt.
    #[serde(rename = "baseDelayMs", with = "duration_ms")]
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    #[serde(rename = "maxDelayMs", with = "duration_ms")]
    pub max_delay: Duration,
    /// Growth factor applied per attempt.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            backoff_multiplier: 2.0,
        }
    }
}

/// Outbound channel a notification is delivered through.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryChannel {
    Email,
    Sms,
    Push,
    Webhook,
}

impl DeliveryChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Push => "push",
            Self::Webhook => "webhook",
        }
    }
}

impl fmt::Display for DeliveryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryChannel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "sms" => Ok(Self::Sms),
            "push" => Ok(Self::Push),
            "webhook" => Ok(Self::Webhook),
            other => Err(ValidationError::InvalidInput(format!(
                "Unknown delivery channel: {}",
                other
            ))),
        }
    }
}

/// Durable per-item attempt telemetry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryAttemptRecord {
    pub resource_id: String,
    pub channel: DeliveryChannel,
    pub attempt_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub delivered: bool,
}

impl RetryAttemptRecord {
    pub fn new(resource_id: impl Into<String>, channel: DeliveryChannel) -> Self {
        Self {
            resource_id: resource_id.into(),
            channel,
            attempt_count: 0,
            last_attempt_at: None,
            last_error: None,
            delivered: false,
        }
    }
}

/// Summary exposed to dashboards and admin tooling.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryStats {
    pub total_attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub is_delivered: bool,
}

impl From<RetryAttemptRecord> for RetryStats {
    fn from(record: RetryAttemptRecord) -> Self {
        Self {
            total_attempts: record.attempt_count,
            last_attempt_at: record.last_attempt_at,
            last_error: record.last_error,
            is_delivered: record.delivered,
        }
    }
}
