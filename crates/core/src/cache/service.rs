use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use log::{debug, error, info, warn};

use super::model::{CacheEntry, CacheFreshnessConfig, CacheStats, RefreshSummary, WarmUpSummary};
use super::traits::{ActiveSubjectSource, CacheStore, RecommendationGenerator};
use crate::errors::Result;

/// Releases the refresh flag when a batch job ends, including on cancellation.
struct RefreshGuard<'a> {
    running: &'a AtomicBool,
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Keeps the recommendation cache populated and fresh.
///
/// Batch jobs (`refresh_many`, `refresh_stale`, `warm_up`) share one running
/// flag. A job triggered while another is running is skipped and returns
/// `None`; it is never queued.
pub struct CacheFreshnessManager {
    store: Arc<dyn CacheStore>,
    subjects: Arc<dyn ActiveSubjectSource>,
    generator: Arc<dyn RecommendationGenerator>,
    config: CacheFreshnessConfig,
    refresh_running: AtomicBool,
}

impl CacheFreshnessManager {
    pub fn new(
        store: Arc<dyn CacheStore>,
        subjects: Arc<dyn ActiveSubjectSource>,
        generator: Arc<dyn RecommendationGenerator>,
        config: CacheFreshnessConfig,
    ) -> Self {
        Self {
            store,
            subjects,
            generator,
            config,
            refresh_running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &CacheFreshnessConfig {
        &self.config
    }

    pub fn is_refresh_running(&self) -> bool {
        self.refresh_running.load(Ordering::Acquire)
    }

    fn try_begin(&self, job: &str) -> Option<RefreshGuard<'_>> {
        match self
            .refresh_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Some(RefreshGuard {
                running: &self.refresh_running,
            }),
            Err(_) => {
                info!("Skipping cache {}: a refresh is already running", job);
                None
            }
        }
    }

    /// Invalidate and recompute each subject in batches.
    ///
    /// One subject's failure is counted and logged but never stops the run.
    /// Returns `None` when another refresh is already in progress.
    pub async fn refresh_many(&self, subject_ids: &[String]) -> Option<RefreshSummary> {
        let _guard = self.try_begin("refresh")?;
        Some(self.refresh_batches(subject_ids).await)
    }

    /// Refresh every subject whose entry is older than `stale_after` but not
    /// yet expired.
    pub async fn refresh_stale(&self) -> Result<Option<RefreshSummary>> {
        let Some(_guard) = self.try_begin("stale refresh") else {
            return Ok(None);
        };

        let stale = self
            .store
            .list_stale_subjects(self.config.stale_after)
            .await?;
        if stale.is_empty() {
            debug!("No stale cache entries to refresh");
            return Ok(Some(RefreshSummary::default()));
        }

        info!("Refreshing {} stale cache entries", stale.len());
        Ok(Some(self.refresh_batches(&stale).await))
    }

    /// Invalidate and recompute a single subject now.
    ///
    /// Returns the entry held by the store afterwards. Recompute errors are
    /// propagated to the caller.
    pub async fn force_refresh_one(&self, subject_id: &str) -> Result<CacheEntry> {
        self.recompute(subject_id).await
    }

    /// Flag every past-expiry entry in one bulk write. Returns the count.
    pub async fn cleanup_expired(&self) -> Result<u64> {
        let expired = self.store.count_expired().await?;
        if expired == 0 {
            debug!("Cache cleanup: no expired entries");
            return Ok(0);
        }

        let marked = self.store.mark_expired().await?;
        info!("Cache cleanup: marked {} expired entries", marked);
        Ok(expired)
    }

    /// Populate the cache for active subjects that lack a fresh entry.
    ///
    /// Subjects already holding an unexpired entry are never recomputed.
    /// Returns `None` when another refresh is already in progress.
    pub async fn warm_up(&self) -> Result<Option<WarmUpSummary>> {
        let Some(_guard) = self.try_begin("warm-up") else {
            return Ok(None);
        };

        let active = self.subjects.active_subject_ids().await?;
        let mut summary = WarmUpSummary {
            active_subjects: active.len(),
            ..Default::default()
        };

        let mut missing = Vec::new();
        for subject_id in active {
            match self.store.get_fresh(&subject_id).await {
                Ok(Some(_)) => summary.already_fresh += 1,
                Ok(None) => missing.push(subject_id),
                Err(e) => {
                    warn!(
                        "Warm-up: cache lookup for '{}' failed, skipping: {}",
                        subject_id, e
                    );
                    summary.error_count += 1;
                }
            }
        }

        if missing.is_empty() {
            debug!(
                "Warm-up: all {} active subjects are fresh",
                summary.active_subjects
            );
            return Ok(Some(summary));
        }

        info!(
            "Warm-up: refreshing {} of {} active subjects",
            missing.len(),
            summary.active_subjects
        );
        let refreshed = self.refresh_batches(&missing).await;
        summary.refreshed_count = refreshed.refreshed_count;
        summary.error_count += refreshed.error_count;
        Ok(Some(summary))
    }

    pub async fn get_stats(&self) -> Result<CacheStats> {
        Ok(CacheStats {
            is_refresh_running: self.is_refresh_running(),
            stale_count: self.store.count_stale(self.config.stale_after).await?,
            active_subject_count: self.subjects.active_subject_ids().await?.len() as u64,
            total_count: self.store.count_all().await?,
            expired_count: self.store.count_expired().await?,
        })
    }

    async fn refresh_batches(&self, subject_ids: &[String]) -> RefreshSummary {
        let batch_size = self.config.batch_size.max(1);
        let mut summary = RefreshSummary {
            total_subjects: subject_ids.len(),
            ..Default::default()
        };

        for (index, batch) in subject_ids.chunks(batch_size).enumerate() {
            if index > 0 && !self.config.batch_delay.is_zero() {
                tokio::time::sleep(self.config.batch_delay).await;
            }

            let outcomes = join_all(batch.iter().map(|id| self.recompute(id))).await;
            for (subject_id, outcome) in batch.iter().zip(outcomes) {
                match outcome {
                    Ok(_) => summary.refreshed_count += 1,
                    Err(e) => {
                        error!("Failed to refresh cache for '{}': {}", subject_id, e);
                        summary.error_count += 1;
                    }
                }
            }
            debug!(
                "Cache refresh batch {} done ({} of {} subjects processed)",
                index + 1,
                (index * batch_size + batch.len()).min(subject_ids.len()),
                subject_ids.len()
            );
        }

        info!(
            "Cache refresh complete: {} refreshed, {} failed, {} total",
            summary.refreshed_count, summary.error_count, summary.total_subjects
        );
        summary
    }

    async fn recompute(&self, subject_id: &str) -> Result<CacheEntry> {
        self.store.invalidate(subject_id).await?;
        let payload = self.generator.generate(subject_id).await?;
        let entry = CacheEntry::new(subject_id, payload, Utc::now(), self.config.freshness_window)?;

        if self.store.upsert(&entry).await? {
            return Ok(entry);
        }

        debug!(
            "Cache entry for '{}' was superseded by a newer computation",
            subject_id
        );
        Ok(self.store.get_fresh(subject_id).await?.unwrap_or(entry))
    }
}
