//! Database models for retry attempt telemetry.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use projecthub_core::errors::Error;
use projecthub_core::retry::{DeliveryChannel, RetryAttemptRecord};
use serde::{Deserialize, Serialize};

use crate::utils::{format_timestamp, parse_timestamp};

/// Database model for retry attempt records
#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    PartialEq,
    Serialize,
    Deserialize,
    Debug,
    Clone,
)]
#[diesel(table_name = crate::schema::retry_attempts)]
#[diesel(primary_key(resource_id))]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RetryAttemptDB {
    pub resource_id: String,
    pub channel: String,
    pub attempt_count: i32,
    pub last_attempt_at: Option<String>,
    pub last_error: Option<String>,
    pub delivered: bool,
    pub updated_at: String,
}

impl RetryAttemptDB {
    pub fn from_record(record: &RetryAttemptRecord, updated_at: DateTime<Utc>) -> Self {
        Self {
            resource_id: record.resource_id.clone(),
            channel: record.channel.as_str().to_string(),
            attempt_count: i32::try_from(record.attempt_count).unwrap_or(i32::MAX),
            last_attempt_at: record.last_attempt_at.map(format_timestamp),
            last_error: record.last_error.clone(),
            delivered: record.delivered,
            updated_at: format_timestamp(updated_at),
        }
    }
}

// Conversion to domain model
impl TryFrom<RetryAttemptDB> for RetryAttemptRecord {
    type Error = Error;

    fn try_from(db: RetryAttemptDB) -> Result<Self, Self::Error> {
        let channel: DeliveryChannel = db.channel.parse()?;
        let last_attempt_at = db
            .last_attempt_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .map_err(Error::from)?;

        Ok(Self {
            resource_id: db.resource_id,
            channel,
            attempt_count: u32::try_from(db.attempt_count).unwrap_or(0),
            last_attempt_at,
            last_error: db.last_error,
            delivered: db.delivered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_conversion_keeps_fields() {
        let mut record = RetryAttemptRecord::new("notif-1", DeliveryChannel::Sms);
        record.attempt_count = 2;
        record.last_attempt_at = Some(parse_timestamp("2026-03-04T05:06:07.890Z").unwrap());
        record.last_error = Some("carrier gateway down".into());

        let db = RetryAttemptDB::from_record(&record, Utc::now());
        assert_eq!(db.channel, "sms");
        assert_eq!(db.last_attempt_at.as_deref(), Some("2026-03-04T05:06:07.890Z"));

        let back = RetryAttemptRecord::try_from(db).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_unknown_channel_is_rejected() {
        let mut db = RetryAttemptDB::from_record(
            &RetryAttemptRecord::new("notif-1", DeliveryChannel::Email),
            Utc::now(),
        );
        db.channel = "pigeon".into();
        assert!(RetryAttemptRecord::try_from(db).is_err());
    }
}
