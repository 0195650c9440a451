use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::model::CacheEntry;
use crate::errors::Result;

/// Keyed store for computed recommendation payloads.
///
/// Implementations evaluate expiry and age against the current wall clock.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Gets the entry for a subject if it is unflagged and not past expiry.
    async fn get_fresh(&self, subject_id: &str) -> Result<Option<CacheEntry>>;

    /// Gets the newest entry computed within `max_age`, ignoring expiry.
    ///
    /// Recovery uses this to serve slightly stale data when the primary
    /// source is down.
    async fn get_latest_within(
        &self,
        subject_id: &str,
        max_age: Duration,
    ) -> Result<Option<CacheEntry>>;

    /// Stores `entry` unless the stored entry has a later `computed_at`.
    ///
    /// Returns whether the entry was written.
    async fn upsert(&self, entry: &CacheEntry) -> Result<bool>;

    /// Flags the subject's entry as expired. Unknown subjects are a no-op.
    async fn invalidate(&self, subject_id: &str) -> Result<()>;

    /// Counts unflagged entries whose expiry time has passed.
    async fn count_expired(&self) -> Result<u64>;

    /// Flags every entry whose expiry time has passed. Returns rows changed.
    async fn mark_expired(&self) -> Result<u64>;

    /// Subjects whose fresh entry was computed more than `older_than` ago.
    async fn list_stale_subjects(&self, older_than: Duration) -> Result<Vec<String>>;

    async fn count_stale(&self, older_than: Duration) -> Result<u64>;

    async fn count_all(&self) -> Result<u64>;
}

/// Source of the subjects worth keeping warm.
#[async_trait]
pub trait ActiveSubjectSource: Send + Sync {
    async fn active_subject_ids(&self) -> Result<Vec<String>>;
}

/// The primary recompute operation for a subject's recommendations.
#[async_trait]
pub trait RecommendationGenerator: Send + Sync {
    async fn generate(&self, subject_id: &str) -> Result<Value>;
}
