use async_trait::async_trait;

use super::model::RetryAttemptRecord;
use crate::errors::Result;

/// Storage interface for per-item delivery attempt telemetry.
///
/// Records are read by external dashboards, so implementations must make a
/// saved record durable before returning.
#[async_trait]
pub trait RetryAttemptStore: Send + Sync {
    /// Gets the record for a deliverable item, if one exists.
    async fn get_record(&self, resource_id: &str) -> Result<Option<RetryAttemptRecord>>;

    /// Inserts or replaces the record keyed by `record.resource_id`.
    async fn save_record(&self, record: &RetryAttemptRecord) -> Result<()>;

    /// Clears delivered/error/attempt fields so a fresh cycle can start.
    ///
    /// Unknown ids are a no-op.
    async fn reset_record(&self, resource_id: &str) -> Result<()>;
}
