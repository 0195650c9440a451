//! Recommendation cache repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::SqliteConnection;
use log::debug;
use std::sync::Arc;
use std::time::Duration;

use projecthub_core::cache::{CacheEntry, CacheStore};
use projecthub_core::utils::time_utils::sub_duration;
use projecthub_core::Result;

use super::model::RecommendationCacheDB;
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::recommendation_cache;
use crate::schema::recommendation_cache::dsl::*;
use crate::utils::format_timestamp;

pub struct RecommendationCacheRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl RecommendationCacheRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    fn now_str() -> String {
        format_timestamp(Utc::now())
    }

    fn cutoff_str(age: Duration) -> String {
        format_timestamp(sub_duration(Utc::now(), age))
    }

    fn load_one(
        &self,
        query: impl FnOnce(&mut SqliteConnection) -> QueryResult<Option<RecommendationCacheDB>>,
    ) -> Result<Option<CacheEntry>> {
        let mut conn = get_connection(&self.pool)?;
        let row = query(&mut conn).map_err(StorageError::from)?;
        row.map(CacheEntry::try_from).transpose()
    }

    fn count_where_stale(&self, older_than: Duration) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        let count = recommendation_cache
            .filter(is_expired.eq(false))
            .filter(expires_at.gt(Self::now_str()))
            .filter(computed_at.lt(Self::cutoff_str(older_than)))
            .count()
            .get_result::<i64>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(count)
    }
}

#[async_trait]
impl CacheStore for RecommendationCacheRepository {
    async fn get_fresh(&self, subject: &str) -> Result<Option<CacheEntry>> {
        let now = Self::now_str();
        self.load_one(|conn| {
            recommendation_cache
                .find(subject)
                .filter(is_expired.eq(false))
                .filter(expires_at.gt(now))
                .first::<RecommendationCacheDB>(conn)
                .optional()
        })
    }

    async fn get_latest_within(
        &self,
        subject: &str,
        max_age: Duration,
    ) -> Result<Option<CacheEntry>> {
        let cutoff = Self::cutoff_str(max_age);
        self.load_one(|conn| {
            recommendation_cache
                .find(subject)
                .filter(computed_at.ge(cutoff))
                .first::<RecommendationCacheDB>(conn)
                .optional()
        })
    }

    async fn upsert(&self, entry: &CacheEntry) -> Result<bool> {
        let entry_db = RecommendationCacheDB::try_from(entry)?;

        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<bool> {
                let existing = recommendation_cache
                    .find(entry_db.subject_id.as_str())
                    .select(computed_at)
                    .first::<String>(conn)
                    .optional()
                    .map_err(StorageError::from)?;

                // Compared at stored precision; an equal timestamp is overwritten.
                if let Some(existing) = existing {
                    if existing > entry_db.computed_at {
                        debug!(
                            "Keeping newer cache entry for '{}' computed at {}",
                            entry_db.subject_id, existing
                        );
                        return Ok(false);
                    }
                }

                diesel::insert_into(recommendation_cache::table)
                    .values(&entry_db)
                    .on_conflict(subject_id)
                    .do_update()
                    .set(&entry_db)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(true)
            })
            .await
    }

    async fn invalidate(&self, subject: &str) -> Result<()> {
        let subject_owned = subject.to_string();

        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::update(recommendation_cache.find(subject_owned))
                    .set(is_expired.eq(true))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn count_expired(&self) -> Result<u64> {
        let mut conn = get_connection(&self.pool)?;
        let count = recommendation_cache
            .filter(is_expired.eq(false))
            .filter(expires_at.le(Self::now_str()))
            .count()
            .get_result::<i64>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(count.max(0) as u64)
    }

    async fn mark_expired(&self) -> Result<u64> {
        let now = Self::now_str();

        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<u64> {
                let updated = diesel::update(
                    recommendation_cache
                        .filter(is_expired.eq(false))
                        .filter(expires_at.le(now)),
                )
                .set(is_expired.eq(true))
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(updated as u64)
            })
            .await
    }

    async fn list_stale_subjects(&self, older_than: Duration) -> Result<Vec<String>> {
        let mut conn = get_connection(&self.pool)?;
        let subjects = recommendation_cache
            .filter(is_expired.eq(false))
            .filter(expires_at.gt(Self::now_str()))
            .filter(computed_at.lt(Self::cutoff_str(older_than)))
            .order(computed_at.asc())
            .select(subject_id)
            .load::<String>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(subjects)
    }

    async fn count_stale(&self, older_than: Duration) -> Result<u64> {
        Ok(self.count_where_stale(older_than)?.max(0) as u64)
    }

    async fn count_all(&self) -> Result<u64> {
        let mut conn = get_connection(&self.pool)?;
        let count = recommendation_cache
            .count()
            .get_result::<i64>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(count.max(0) as u64)
    }
}
