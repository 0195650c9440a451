//! Timestamp helpers for TEXT columns.
//!
//! Timestamps are stored as RFC 3339 UTC strings with a fixed microsecond
//! precision and a `Z` suffix. Fixed width keeps lexicographic order equal to
//! chronological order, so range filters can compare the strings directly.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::errors::StorageError;

pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::SerializationError(format!("Invalid timestamp '{}': {}", value, e)))
}
