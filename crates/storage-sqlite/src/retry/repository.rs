//! Retry attempt repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::SqliteConnection;
use std::sync::Arc;

use projecthub_core::retry::{RetryAttemptRecord, RetryAttemptStore};
use projecthub_core::Result;

use super::model::RetryAttemptDB;
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::retry_attempts;
use crate::schema::retry_attempts::dsl::*;
use crate::utils::format_timestamp;

pub struct RetryAttemptRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl RetryAttemptRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    fn get_record_impl(&self, id: &str) -> Result<Option<RetryAttemptRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let row = retry_attempts
            .find(id)
            .first::<RetryAttemptDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        row.map(RetryAttemptRecord::try_from).transpose()
    }
}

#[async_trait]
impl RetryAttemptStore for RetryAttemptRepository {
    async fn get_record(&self, id: &str) -> Result<Option<RetryAttemptRecord>> {
        self.get_record_impl(id)
    }

    async fn save_record(&self, record: &RetryAttemptRecord) -> Result<()> {
        let record_db = RetryAttemptDB::from_record(record, Utc::now());

        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::insert_into(retry_attempts::table)
                    .values(&record_db)
                    .on_conflict(resource_id)
                    .do_update()
                    .set(&record_db)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn reset_record(&self, id: &str) -> Result<()> {
        let id_owned = id.to_string();
        let now = format_timestamp(Utc::now());

        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::update(retry_attempts.find(id_owned))
                    .set((
                        attempt_count.eq(0),
                        last_attempt_at.eq(None::<String>),
                        last_error.eq(None::<String>),
                        delivered.eq(false),
                        updated_at.eq(now),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, run_migrations, spawn_writer};
    use projecthub_core::retry::{DeliveryChannel, RetryExecutor, RetryStats};
    use projecthub_core::errors::{Error, ServiceError};
    use tempfile::tempdir;

    async fn create_test_repository() -> (RetryAttemptRepository, tempfile::TempDir) {
        let temp_dir = tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");
        let db_path_str = db_path.to_string_lossy().to_string();

        let pool = create_pool(&db_path_str).expect("Failed to create pool");
        run_migrations(&pool).expect("Failed to run migrations");
        let writer = spawn_writer((*pool).clone());

        (RetryAttemptRepository::new(pool, writer), temp_dir)
    }

    #[tokio::test]
    async fn test_save_and_get_record() {
        let (repo, _dir) = create_test_repository().await;
        assert!(repo.get_record("notif-1").await.unwrap().is_none());

        let mut record = RetryAttemptRecord::new("notif-1", DeliveryChannel::Email);
        record.attempt_count = 1;
        record.last_attempt_at = Some(Utc::now());
        record.last_error = Some("smtp relay refused connection".into());
        repo.save_record(&record).await.unwrap();

        let loaded = repo.get_record("notif-1").await.unwrap().unwrap();
        assert_eq!(loaded.attempt_count, 1);
        assert_eq!(loaded.channel, DeliveryChannel::Email);
        assert_eq!(loaded.last_error, record.last_error);
        assert!(!loaded.delivered);
    }

    #[tokio::test]
    async fn test_save_overwrites_existing_record() {
        let (repo, _dir) = create_test_repository().await;

        let mut record = RetryAttemptRecord::new("notif-2", DeliveryChannel::Push);
        record.attempt_count = 1;
        record.last_error = Some("timeout".into());
        repo.save_record(&record).await.unwrap();

        record.attempt_count = 2;
        record.delivered = true;
        repo.save_record(&record).await.unwrap();

        let loaded = repo.get_record("notif-2").await.unwrap().unwrap();
        assert_eq!(loaded.attempt_count, 2);
        assert!(loaded.delivered);
        assert_eq!(loaded.last_error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_reset_record_clears_fields() {
        let (repo, _dir) = create_test_repository().await;

        let mut record = RetryAttemptRecord::new("notif-3", DeliveryChannel::Webhook);
        record.attempt_count = 3;
        record.last_attempt_at = Some(Utc::now());
        record.last_error = Some("503".into());
        repo.save_record(&record).await.unwrap();

        repo.reset_record("notif-3").await.unwrap();
        let loaded = repo.get_record("notif-3").await.unwrap().unwrap();
        assert_eq!(loaded.attempt_count, 0);
        assert!(loaded.last_attempt_at.is_none());
        assert!(loaded.last_error.is_none());
        assert!(!loaded.delivered);

        // Unknown ids are a no-op.
        repo.reset_record("never-sent").await.unwrap();
        assert!(repo.get_record("never-sent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_executor_persists_through_sqlite() {
        let (repo, _dir) = create_test_repository().await;
        let executor = RetryExecutor::new(Arc::new(repo));
        let config = projecthub_core::retry::RetryConfig {
            max_retries: 2,
            base_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(5),
            backoff_multiplier: 2.0,
        };

        executor
            .execute_with_retry(
                || async {
                    Err::<(), Error>(ServiceError::Unavailable("smtp down".into()).into())
                },
                "digest-1",
                DeliveryChannel::Email,
                Some(config),
            )
            .await
            .unwrap_err();

        let stats = executor.get_retry_stats("digest-1").await.unwrap();
        assert_eq!(stats.total_attempts, 2);
        assert!(!stats.is_delivered);
        assert!(stats.last_error.unwrap().contains("smtp down"));

        executor.reset_for_retry("digest-1").await.unwrap();
        assert_eq!(
            executor.get_retry_stats("digest-1").await.unwrap(),
            RetryStats::default()
        );
    }
}
