//! Background scheduler for periodic cache maintenance.
//!
//! Each tick marks expired entries, refreshes stale ones and warms up active
//! subjects that have no fresh entry.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::interval;

use super::service::CacheFreshnessManager;
use crate::utils::time_utils::duration_ms;

/// Initial delay before the first run, letting the host finish starting.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(60);

pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    #[serde(rename = "initialDelayMs", with = "duration_ms")]
    pub initial_delay: Duration,
    #[serde(rename = "intervalMs", with = "duration_ms")]
    pub interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: DEFAULT_INITIAL_DELAY,
            interval: DEFAULT_MAINTENANCE_INTERVAL,
        }
    }
}

/// Starts the background cache maintenance loop.
///
/// Returns `None` when the scheduler is disabled. Aborting the returned
/// handle stops the loop.
pub fn start_cache_freshness_scheduler(
    manager: Arc<CacheFreshnessManager>,
    config: SchedulerConfig,
) -> Option<JoinHandle<()>> {
    if !config.enabled {
        info!("Cache freshness scheduler disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        info!(
            "Cache freshness scheduler started ({}s interval)",
            config.interval.as_secs()
        );

        tokio::time::sleep(config.initial_delay).await;

        // First tick is immediate.
        let mut ticker = interval(config.interval.max(Duration::from_millis(1)));

        loop {
            ticker.tick().await;
            run_scheduled_maintenance(&manager).await;
        }
    }))
}

/// Runs one maintenance pass. Each step logs its own failure and the pass
/// continues with the next step.
pub async fn run_scheduled_maintenance(manager: &CacheFreshnessManager) {
    debug!("Running scheduled cache maintenance...");

    match manager.cleanup_expired().await {
        Ok(0) => {}
        Ok(count) => info!("Scheduled cleanup marked {} expired entries", count),
        Err(e) => warn!("Scheduled cache cleanup failed: {}", e),
    }

    match manager.refresh_stale().await {
        Ok(Some(summary)) if summary.total_subjects > 0 => info!(
            "Scheduled stale refresh: {} refreshed, {} failed",
            summary.refreshed_count, summary.error_count
        ),
        Ok(_) => {}
        Err(e) => warn!("Scheduled stale refresh failed: {}", e),
    }

    match manager.warm_up().await {
        Ok(Some(summary)) if summary.refreshed_count + summary.error_count > 0 => info!(
            "Scheduled warm-up: {} refreshed, {} failed, {} already fresh",
            summary.refreshed_count, summary.error_count, summary.already_fresh
        ),
        Ok(_) => {}
        Err(e) => warn!("Scheduled warm-up failed: {}", e),
    }
}
