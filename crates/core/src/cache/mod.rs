//! Recommendation cache freshness.
//!
//! - **Models** (`model.rs`) - Cache entries, tuning, summaries
//! - **Traits** (`traits.rs`) - Store, active-subject and recompute collaborators
//! - **Service** (`service.rs`) - Batch refresh, cleanup and warm-up
//! - **Scheduler** (`scheduler.rs`) - Periodic background maintenance
//!
//! Staleness is always measured from an entry's `computed_at`.

pub mod model;
pub mod scheduler;
pub mod service;
pub mod traits;

pub use model::{
    CacheEntry, CacheFreshnessConfig, CacheStats, RefreshSummary, WarmUpSummary,
    DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE, DEFAULT_FRESHNESS_WINDOW, DEFAULT_STALE_AFTER,
};
pub use scheduler::{run_scheduled_maintenance, start_cache_freshness_scheduler, SchedulerConfig};
pub use service::CacheFreshnessManager;
pub use traits::{ActiveSubjectSource, CacheStore, RecommendationGenerator};
