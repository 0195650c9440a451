//! Retry executor implementation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::sync::Mutex as AsyncMutex;

use super::backoff::{backoff_delay, random_jitter};
use super::errors::RetryExhaustedError;
use super::model::{DeliveryChannel, RetryAttemptRecord, RetryConfig, RetryStats};
use super::traits::RetryAttemptStore;
use crate::errors::Result;

/// Runs flaky delivery operations with exponential backoff.
///
/// Calls for the same resource id take turns: a second call waits until the
/// first has persisted its last attempt. Different ids retry concurrently.
/// Sleeping between attempts yields the task instead of blocking a thread.
pub struct RetryExecutor {
    store: Arc<dyn RetryAttemptStore>,
    default_config: RetryConfig,
    resource_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl RetryExecutor {
    pub fn new(store: Arc<dyn RetryAttemptStore>) -> Self {
        Self::with_config(store, RetryConfig::default())
    }

    pub fn with_config(store: Arc<dyn RetryAttemptStore>, config: RetryConfig) -> Self {
        Self {
            store,
            default_config: config,
            resource_locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_resources(&self) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
        self.resource_locks.lock().unwrap_or_else(|poisoned| {
            warn!("Retry lock table mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn resource_lock(&self, resource_id: &str) -> Arc<AsyncMutex<()>> {
        self.lock_resources()
            .entry(resource_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Drop the table entry once no other call holds or waits on it.
    fn release_resource_lock(&self, resource_id: &str, lock: Arc<AsyncMutex<()>>) {
        let mut locks = self.lock_resources();
        // One reference in the table, one held here.
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(resource_id);
        }
    }

    /// Run `operation` until it succeeds or `max_retries` attempts have failed.
    ///
    /// The outcome of each attempt is persisted before the next sleep. On
    /// exhaustion returns `Error::RetryExhausted` carrying the last error.
    pub async fn execute_with_retry<F, Fut, T>(
        &self,
        mut operation: F,
        resource_id: &str,
        channel: DeliveryChannel,
        config: Option<RetryConfig>,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let config = config.unwrap_or_else(|| self.default_config.clone());
        let lock = self.resource_lock(resource_id);
        let outcome = {
            let _turn = lock.lock().await;
            self.run_attempts(&mut operation, resource_id, channel, &config)
                .await
        };
        self.release_resource_lock(resource_id, lock);
        outcome
    }

    async fn run_attempts<F, Fut, T>(
        &self,
        operation: &mut F,
        resource_id: &str,
        channel: DeliveryChannel,
        config: &RetryConfig,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = config.max_retries.max(1);
        let mut record = self.load_record(resource_id, channel).await;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let outcome = operation().await;
            record.attempt_count = record.attempt_count.saturating_add(1);
            record.last_attempt_at = Some(Utc::now());

            match outcome {
                Ok(value) => {
                    record.delivered = true;
                    self.persist(&record).await;
                    if attempt > 1 {
                        info!(
                            "Delivered '{}' via {} on attempt {}/{}",
                            resource_id, channel, attempt, max_attempts
                        );
                    } else {
                        debug!("Delivered '{}' via {} on first attempt", resource_id, channel);
                    }
                    return Ok(value);
                }
                Err(err) => {
                    last_error = err.to_string();
                    record.delivered = false;
                    record.last_error = Some(last_error.clone());
                    self.persist(&record).await;

                    if attempt == max_attempts {
                        break;
                    }

                    let delay = backoff_delay(attempt, config, random_jitter());
                    warn!(
                        "Attempt {}/{} to deliver '{}' via {} failed: {}. Retrying in {}ms",
                        attempt,
                        max_attempts,
                        resource_id,
                        channel,
                        last_error,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        error!(
            "Giving up on '{}' via {} after {} attempts: {}",
            resource_id, channel, max_attempts, last_error
        );
        Err(RetryExhaustedError {
            resource_id: resource_id.to_string(),
            attempts: max_attempts,
            last_error,
        }
        .into())
    }

    /// Attempt telemetry for one item. Unseen ids report zeroed stats.
    pub async fn get_retry_stats(&self, resource_id: &str) -> Result<RetryStats> {
        Ok(self
            .store
            .get_record(resource_id)
            .await?
            .map(RetryStats::from)
            .unwrap_or_default())
    }

    /// Clear an item's delivered/error/attempt fields so it can be retried anew.
    pub async fn reset_for_retry(&self, resource_id: &str) -> Result<()> {
        info!("Resetting retry state for '{}'", resource_id);
        self.store.reset_record(resource_id).await
    }

    async fn load_record(&self, resource_id: &str, channel: DeliveryChannel) -> RetryAttemptRecord {
        match self.store.get_record(resource_id).await {
            Ok(Some(mut record)) => {
                record.channel = channel;
                record
            }
            Ok(None) => RetryAttemptRecord::new(resource_id, channel),
            Err(e) => {
                warn!(
                    "Failed to load retry record for '{}', starting from zero: {}",
                    resource_id, e
                );
                RetryAttemptRecord::new(resource_id, channel)
            }
        }
    }

    async fn persist(&self, record: &RetryAttemptRecord) {
        if let Err(e) = self.store.save_record(record).await {
            error!(
                "Failed to persist attempt {} for '{}': {}",
                record.attempt_count, record.resource_id, e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{Error, ServiceError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    // =========================================================================
    // Mock RetryAttemptStore
    // =========================================================================

    #[derive(Default)]
    struct MockRetryStore {
        records: Mutex<HashMap<String, RetryAttemptRecord>>,
        history: Mutex<Vec<RetryAttemptRecord>>,
        fail_on_save: Mutex<bool>,
    }

    impl MockRetryStore {
        fn history(&self) -> Vec<RetryAttemptRecord> {
            self.history.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RetryAttemptStore for MockRetryStore {
        async fn get_record(&self, resource_id: &str) -> Result<Option<RetryAttemptRecord>> {
            Ok(self.records.lock().unwrap().get(resource_id).cloned())
        }

        async fn save_record(&self, record: &RetryAttemptRecord) -> Result<()> {
            if *self.fail_on_save.lock().unwrap() {
                return Err(Error::Unexpected("Intentional save failure".into()));
            }
            self.history.lock().unwrap().push(record.clone());
            self.records
                .lock()
                .unwrap()
                .insert(record.resource_id.clone(), record.clone());
            Ok(())
        }

        async fn reset_record(&self, resource_id: &str) -> Result<()> {
            if let Some(record) = self.records.lock().unwrap().get_mut(resource_id) {
                record.attempt_count = 0;
                record.last_attempt_at = None;
                record.last_error = None;
                record.delivered = false;
            }
            Ok(())
        }
    }

    fn smtp_down() -> Error {
        ServiceError::Unavailable("smtp relay refused connection".into()).into()
    }

    fn executor(store: Arc<MockRetryStore>) -> RetryExecutor {
        RetryExecutor::new(store)
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_max_retries() {
        let store = Arc::new(MockRetryStore::default());
        let executor = executor(store.clone());
        let calls = &AtomicU32::new(0);

        let err = executor
            .execute_with_retry(
                || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), Error>(smtp_down())
                },
                "notif-1",
                DeliveryChannel::Email,
                None,
            )
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            Error::RetryExhausted(e) => {
                assert_eq!(e.resource_id, "notif-1");
                assert_eq!(e.attempts, 3);
                assert!(e.last_error.contains("smtp relay refused connection"));
            }
            other => panic!("expected RetryExhausted, got {:?}", other),
        }

        let stats = executor.get_retry_stats("notif-1").await.unwrap();
        assert!(!stats.is_delivered);
        assert_eq!(stats.total_attempts, 3);
        assert!(stats.last_attempt_at.is_some());
        assert!(stats.last_error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_attempt_is_persisted_in_order() {
        let store = Arc::new(MockRetryStore::default());
        let executor = executor(store.clone());

        executor
            .execute_with_retry(
                || async { Err::<(), Error>(smtp_down()) },
                "notif-2",
                DeliveryChannel::Sms,
                Some(RetryConfig {
                    max_retries: 4,
                    ..Default::default()
                }),
            )
            .await
            .unwrap_err();

        let counts: Vec<u32> = store.history().iter().map(|r| r.attempt_count).collect();
        assert_eq!(counts, vec![1, 2, 3, 4]);
        assert!(store.history().iter().all(|r| !r.delivered));
        assert!(store
            .history()
            .iter()
            .all(|r| r.channel == DeliveryChannel::Sms));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let store = Arc::new(MockRetryStore::default());
        let executor = executor(store.clone());
        let calls = &AtomicU32::new(0);

        let value = executor
            .execute_with_retry(
                || async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(smtp_down())
                    } else {
                        Ok::<_, Error>("queued")
                    }
                },
                "notif-3",
                DeliveryChannel::Email,
                None,
            )
            .await
            .unwrap();

        assert_eq!(value, "queued");
        let stats = executor.get_retry_stats("notif-3").await.unwrap();
        assert!(stats.is_delivered);
        assert_eq!(stats.total_attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleeps_follow_backoff_schedule() {
        let store = Arc::new(MockRetryStore::default());
        let executor = executor(store);
        let attempt_times = &Mutex::new(Vec::new());

        executor
            .execute_with_retry(
                || async move {
                    attempt_times.lock().unwrap().push(Instant::now());
                    Err::<(), Error>(smtp_down())
                },
                "notif-4",
                DeliveryChannel::Push,
                None,
            )
            .await
            .unwrap_err();

        let times = attempt_times.lock().unwrap().clone();
        assert_eq!(times.len(), 3);
        let first_gap = times[1] - times[0];
        let second_gap = times[2] - times[1];
        assert!(first_gap >= Duration::from_millis(1000));
        assert!(first_gap <= Duration::from_millis(1101));
        assert!(second_gap >= Duration::from_millis(2000));
        assert!(second_gap <= Duration::from_millis(2201));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_for_one_id_take_turns() {
        let store = Arc::new(MockRetryStore::default());
        let executor = executor(store.clone());
        let calls = &AtomicU32::new(0);
        let fail = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), Error>(smtp_down())
        };

        let started = Instant::now();
        let (first, second) = tokio::join!(
            executor.execute_with_retry(fail, "notif-1", DeliveryChannel::Email, None),
            executor.execute_with_retry(fail, "notif-1", DeliveryChannel::Email, None),
        );
        first.unwrap_err();
        second.unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 6);
        let counts: Vec<u32> = store.history().iter().map(|r| r.attempt_count).collect();
        assert_eq!(counts, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(executor.get_retry_stats("notif-1").await.unwrap().total_attempts, 6);
        // Two full backoff sequences ran back to back.
        assert!(started.elapsed() >= Duration::from_millis(6000));
        assert!(executor.lock_resources().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_ids_retry_concurrently() {
        let store = Arc::new(MockRetryStore::default());
        let executor = executor(store.clone());
        let fail = || async { Err::<(), Error>(smtp_down()) };

        let started = Instant::now();
        let (first, second) = tokio::join!(
            executor.execute_with_retry(fail, "notif-a", DeliveryChannel::Email, None),
            executor.execute_with_retry(fail, "notif-b", DeliveryChannel::Sms, None),
        );
        first.unwrap_err();
        second.unwrap_err();

        assert!(started.elapsed() < Duration::from_millis(4000));
        assert_eq!(executor.get_retry_stats("notif-a").await.unwrap().total_attempts, 3);
        assert_eq!(executor.get_retry_stats("notif-b").await.unwrap().total_attempts, 3);
    }

    #[tokio::test]
    async fn test_unseen_resource_reports_zeroed_stats() {
        let executor = executor(Arc::new(MockRetryStore::default()));
        let stats = executor.get_retry_stats("never-sent").await.unwrap();
        assert_eq!(stats, RetryStats::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_for_retry_starts_fresh_cycle() {
        let store = Arc::new(MockRetryStore::default());
        let executor = executor(store.clone());
        let config = Some(RetryConfig {
            max_retries: 2,
            ..Default::default()
        });

        executor
            .execute_with_retry(
                || async { Err::<(), Error>(smtp_down()) },
                "notif-5",
                DeliveryChannel::Email,
                config.clone(),
            )
            .await
            .unwrap_err();
        assert_eq!(executor.get_retry_stats("notif-5").await.unwrap().total_attempts, 2);

        executor.reset_for_retry("notif-5").await.unwrap();
        let stats = executor.get_retry_stats("notif-5").await.unwrap();
        assert_eq!(stats, RetryStats::default());

        executor
            .execute_with_retry(|| async { Ok::<_, Error>(()) }, "notif-5", DeliveryChannel::Email, config)
            .await
            .unwrap();
        let stats = executor.get_retry_stats("notif-5").await.unwrap();
        assert_eq!(stats.total_attempts, 1);
        assert!(stats.is_delivered);
        assert!(stats.last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_telemetry_failure_does_not_abort_delivery() {
        let store = Arc::new(MockRetryStore::default());
        *store.fail_on_save.lock().unwrap() = true;
        let executor = executor(store);
        let calls = &AtomicU32::new(0);

        let value = executor
            .execute_with_retry(
                || async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(smtp_down())
                    } else {
                        Ok::<_, Error>(42)
                    }
                },
                "notif-6",
                DeliveryChannel::Webhook,
                None,
            )
            .await
            .unwrap();
        assert_eq!(value, 42);
    }
}
