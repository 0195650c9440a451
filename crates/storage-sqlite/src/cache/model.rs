//! Database models for the recommendation cache.

use std::time::Duration;

use diesel::prelude::*;
use projecthub_core::cache::CacheEntry;
use projecthub_core::errors::Error;
use serde::{Deserialize, Serialize};

use crate::errors::StorageError;
use crate::utils::{format_timestamp, parse_timestamp};

/// Database model for cached recommendation payloads
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
#[diesel(table_name = crate::schema::recommendation_cache)]
#[diesel(primary_key(subject_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RecommendationCacheDB {
    pub subject_id: String,
    /// JSON-encoded payload.
    pub payload: String,
    pub computed_at: String,
    pub expires_at: String,
    pub freshness_window_ms: i64,
    pub is_expired: bool,
}

impl TryFrom<&CacheEntry> for RecommendationCacheDB {
    type Error = Error;

    fn try_from(entry: &CacheEntry) -> Result<Self, Self::Error> {
        Ok(Self {
            subject_id: entry.subject_id.clone(),
            payload: serde_json::to_string(&entry.payload).map_err(StorageError::from)?,
            computed_at: format_timestamp(entry.computed_at),
            expires_at: format_timestamp(entry.expires_at),
            freshness_window_ms: i64::try_from(entry.freshness_window.as_millis())
                .unwrap_or(i64::MAX),
            is_expired: entry.is_expired,
        })
    }
}

// Conversion to domain model
impl TryFrom<RecommendationCacheDB> for CacheEntry {
    type Error = Error;

    fn try_from(db: RecommendationCacheDB) -> Result<Self, Self::Error> {
        let payload = serde_json::from_str(&db.payload).map_err(StorageError::from)?;
        Ok(Self {
            subject_id: db.subject_id,
            payload,
            computed_at: parse_timestamp(&db.computed_at)?,
            expires_at: parse_timestamp(&db.expires_at)?,
            freshness_window: Duration::from_millis(u64::try_from(db.freshness_window_ms).unwrap_or(0)),
            is_expired: db.is_expired,
        })
    }
}
