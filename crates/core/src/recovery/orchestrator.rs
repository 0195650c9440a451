use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use serde_json::{json, Map, Value};

use super::messages::{human_message, suggestions};
use super::model::{FallbackFn, RecoveryMethod, RecoveryOptions, RecoveryResult, TriggeringError};
use crate::cache::CacheStore;
use crate::errors::{Error, Result};

/// Turns a failed primary call into the best available result.
///
/// Stages run in order, each only when enabled and when the previous one
/// produced nothing: recent cache entry, caller fallback, degraded empty
/// payload. The degraded stage always succeeds.
pub struct RecoveryOrchestrator {
    cache: Arc<dyn CacheStore>,
    default_options: RecoveryOptions,
}

impl RecoveryOrchestrator {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self::with_options(cache, RecoveryOptions::default())
    }

    pub fn with_options(cache: Arc<dyn CacheStore>, options: RecoveryOptions) -> Self {
        Self {
            cache,
            default_options: options,
        }
    }

    /// True only for the transient dependency failures.
    pub fn is_recoverable(&self, error: &Error) -> bool {
        error.category().is_recoverable()
    }

    /// Ordered remediation steps to show the user for `error`.
    pub fn get_suggestions(&self, error: &Error) -> Vec<String> {
        suggestions(error.category())
    }

    /// Resolve `error` for `subject_id` through the cache, fallback and
    /// degraded stages.
    pub async fn recover(
        &self,
        error: &Error,
        subject_id: &str,
        fallback: Option<FallbackFn>,
        options: Option<RecoveryOptions>,
    ) -> RecoveryResult {
        let options = options.unwrap_or_else(|| self.default_options.clone());
        let triggering = TriggeringError::from(error);
        info!(
            "Recovering recommendations for '{}' after {} error",
            subject_id, triggering.category
        );

        if options.use_cached_results {
            if let Some(result) = self.try_cache(subject_id, &options).await {
                return self.finish(result, triggering, &options);
            }
        }

        if options.fallback_to_alternate {
            if let Some(fallback) = fallback {
                match fallback().await {
                    Ok(payload) => {
                        info!("Recovered '{}' from fallback source", subject_id);
                        let result = stage_result(
                            payload,
                            RecoveryMethod::Fallback,
                            "Served recommendations from an alternate source.".to_string(),
                            subject_meta(subject_id),
                        );
                        return self.finish(result, triggering, &options);
                    }
                    Err(e) => {
                        warn!("Fallback for '{}' failed: {}", subject_id, e);
                    }
                }
            }
        }

        warn!(
            "No recovery source for '{}', returning degraded result",
            subject_id
        );
        let mut metadata = subject_meta(subject_id);
        metadata.insert("degraded".to_string(), Value::Bool(true));
        let result = stage_result(
            json!([]),
            RecoveryMethod::Degraded,
            "No cached or alternate recommendations were available.".to_string(),
            metadata,
        );
        self.finish(result, triggering, &options)
    }

    /// Run `primary` and recover from recoverable failures.
    ///
    /// Success is returned with `RecoveryMethod::None`. Errors outside the
    /// recoverable categories are returned unchanged.
    pub async fn execute_with_recovery<F, Fut>(
        &self,
        subject_id: &str,
        primary: F,
        fallback: Option<FallbackFn>,
        options: Option<RecoveryOptions>,
    ) -> Result<RecoveryResult>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        match primary().await {
            Ok(payload) => Ok(RecoveryResult::primary(payload)),
            Err(error) if self.is_recoverable(&error) => {
                Ok(self.recover(&error, subject_id, fallback, options).await)
            }
            Err(error) => {
                debug!(
                    "Not recovering '{}': {} errors propagate unchanged",
                    subject_id,
                    error.category()
                );
                Err(error)
            }
        }
    }

    async fn try_cache(&self, subject_id: &str, options: &RecoveryOptions) -> Option<RecoveryResult> {
        let entry = match self
            .cache
            .get_latest_within(subject_id, options.max_cache_age)
            .await
        {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!(
                    "No cache entry for '{}' within {}ms",
                    subject_id,
                    options.max_cache_age.as_millis()
                );
                return None;
            }
            Err(e) => {
                warn!("Cache lookup for '{}' failed during recovery: {}", subject_id, e);
                return None;
            }
        };

        let age = entry.age_at(Utc::now());
        info!(
            "Recovered '{}' from cache entry computed {}s ago",
            subject_id,
            age.num_seconds()
        );

        let mut metadata = subject_meta(subject_id);
        metadata.insert(
            "cachedAt".to_string(),
            Value::String(entry.computed_at.to_rfc3339()),
        );
        metadata.insert("cacheAgeMs".to_string(), json!(age.num_milliseconds()));
        Some(stage_result(
            entry.payload,
            RecoveryMethod::Cache,
            format!(
                "Served cached recommendations computed {} minutes ago.",
                age.num_minutes()
            ),
            metadata,
        ))
    }

    fn finish(
        &self,
        mut result: RecoveryResult,
        triggering: TriggeringError,
        options: &RecoveryOptions,
    ) -> RecoveryResult {
        result.metadata.insert(
            "errorCategory".to_string(),
            Value::String(triggering.category.as_str().to_string()),
        );

        if options.include_human_message {
            let message = human_message(triggering.category, result.recovery_method);
            result.explanation = format!("{} {}", result.explanation, message);
            result
                .metadata
                .insert("userMessage".to_string(), Value::String(message.clone()));
            result.message = Some(message);
        }

        result.error = Some(triggering);
        result
    }
}

fn subject_meta(subject_id: &str) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert(
        "subjectId".to_string(),
        Value::String(subject_id.to_string()),
    );
    metadata
}

fn stage_result(
    payload: Value,
    method: RecoveryMethod,
    explanation: String,
    metadata: Map<String, Value>,
) -> RecoveryResult {
    RecoveryResult {
        payload,
        recovery_method: method,
        message: None,
        explanation,
        metadata,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheEntry;
    use crate::circuit_breaker::CircuitOpenError;
    use crate::errors::{DatabaseError, ErrorCategory, ServiceError};
    use crate::recovery::fallback_fn;
    use crate::utils::time_utils::sub_duration;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    // =========================================================================
    // Mock CacheStore (only the recovery lookup matters here)
    // =========================================================================

    #[derive(Default)]
    struct MockCacheStore {
        entries: Mutex<HashMap<String, CacheEntry>>,
        fail_lookups: bool,
        lookups: AtomicU32,
    }

    impl MockCacheStore {
        fn with_entry_aged(subject_id: &str, age: Duration) -> Self {
            let store = Self::default();
            let entry = CacheEntry::new(
                subject_id,
                json!([{ "task": "t-1", "reason": "cached" }]),
                sub_duration(Utc::now(), age),
                Duration::from_secs(60),
            )
            .unwrap();
            store
                .entries
                .lock()
                .unwrap()
                .insert(subject_id.to_string(), entry);
            store
        }
    }

    #[async_trait]
    impl CacheStore for MockCacheStore {
        async fn get_fresh(&self, subject_id: &str) -> Result<Option<CacheEntry>> {
            let now = Utc::now();
            Ok(self
                .entries
                .lock()
                .unwrap()
                .get(subject_id)
                .filter(|e| e.is_fresh_at(now))
                .cloned())
        }

        async fn get_latest_within(
            &self,
            subject_id: &str,
            max_age: Duration,
        ) -> Result<Option<CacheEntry>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.fail_lookups {
                return Err(DatabaseError::QueryFailed("database is locked".into()).into());
            }
            let cutoff = sub_duration(Utc::now(), max_age);
            Ok(self
                .entries
                .lock()
                .unwrap()
                .get(subject_id)
                .filter(|e| e.computed_at >= cutoff)
                .cloned())
        }

        async fn upsert(&self, _entry: &CacheEntry) -> Result<bool> {
            Ok(true)
        }

        async fn invalidate(&self, _subject_id: &str) -> Result<()> {
            Ok(())
        }

        async fn count_expired(&self) -> Result<u64> {
            Ok(0)
        }

        async fn mark_expired(&self) -> Result<u64> {
            Ok(0)
        }

        async fn list_stale_subjects(&self, _older_than: Duration) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn count_stale(&self, _older_than: Duration) -> Result<u64> {
            Ok(0)
        }

        async fn count_all(&self) -> Result<u64> {
            Ok(self.entries.lock().unwrap().len() as u64)
        }
    }

    fn unavailable() -> Error {
        ServiceError::Unavailable("connection refused".into()).into()
    }

    fn ok_fallback(invoked: Arc<AtomicBool>) -> FallbackFn {
        fallback_fn(move || async move {
            invoked.store(true, Ordering::SeqCst);
            Ok::<_, Error>(json!([{ "task": "t-9", "reason": "popular" }]))
        })
    }

    fn failing_fallback() -> FallbackFn {
        fallback_fn(|| async {
            Err::<Value, Error>(ServiceError::Timeout("alternate timed out".into()).into())
        })
    }

    fn with_max_age(max_age: Duration) -> Option<RecoveryOptions> {
        Some(RecoveryOptions {
            max_cache_age: max_age,
            ..Default::default()
        })
    }

    // =========================================================================
    // Staging
    // =========================================================================

    #[tokio::test]
    async fn test_cache_wins_even_when_fallback_supplied() {
        let store = Arc::new(MockCacheStore::with_entry_aged("s1", Duration::from_secs(600)));
        let orchestrator = RecoveryOrchestrator::new(store);
        let invoked = Arc::new(AtomicBool::new(false));

        let result = orchestrator
            .recover(
                &unavailable(),
                "s1",
                Some(ok_fallback(invoked.clone())),
                None,
            )
            .await;

        assert_eq!(result.recovery_method, RecoveryMethod::Cache);
        assert_eq!(result.payload, json!([{ "task": "t-1", "reason": "cached" }]));
        assert!(!invoked.load(Ordering::SeqCst));
        assert!(result.metadata.contains_key("cachedAt"));
    }

    #[tokio::test]
    async fn test_cache_age_window_scenario() {
        let store = Arc::new(MockCacheStore::with_entry_aged("s1", Duration::from_secs(600)));
        let orchestrator = RecoveryOrchestrator::new(store);

        let within_hour = orchestrator
            .recover(
                &unavailable(),
                "s1",
                None,
                with_max_age(Duration::from_secs(3600)),
            )
            .await;
        assert_eq!(within_hour.recovery_method, RecoveryMethod::Cache);

        let invoked = Arc::new(AtomicBool::new(false));
        let within_five_minutes = orchestrator
            .recover(
                &unavailable(),
                "s1",
                Some(ok_fallback(invoked.clone())),
                with_max_age(Duration::from_secs(300)),
            )
            .await;
        assert_eq!(within_five_minutes.recovery_method, RecoveryMethod::Fallback);
        assert!(invoked.load(Ordering::SeqCst));

        let degraded = orchestrator
            .recover(
                &unavailable(),
                "s1",
                None,
                with_max_age(Duration::from_secs(300)),
            )
            .await;
        assert_eq!(degraded.recovery_method, RecoveryMethod::Degraded);
    }

    #[tokio::test]
    async fn test_fallback_used_without_cache() {
        let orchestrator = RecoveryOrchestrator::new(Arc::new(MockCacheStore::default()));
        let invoked = Arc::new(AtomicBool::new(false));

        let result = orchestrator
            .recover(&unavailable(), "s2", Some(ok_fallback(invoked.clone())), None)
            .await;

        assert_eq!(result.recovery_method, RecoveryMethod::Fallback);
        assert_eq!(result.payload, json!([{ "task": "t-9", "reason": "popular" }]));
        assert!(invoked.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_degraded_when_nothing_succeeds() {
        let orchestrator = RecoveryOrchestrator::new(Arc::new(MockCacheStore::default()));

        let result = orchestrator
            .recover(&unavailable(), "s3", Some(failing_fallback()), None)
            .await;

        assert_eq!(result.recovery_method, RecoveryMethod::Degraded);
        assert!(result.is_degraded());
        assert_eq!(result.payload, json!([]));
        assert_eq!(result.metadata["errorCategory"], json!("service_unavailable"));
        assert_eq!(result.metadata["degraded"], json!(true));
        let error = result.error.unwrap();
        assert_eq!(error.category, ErrorCategory::ServiceUnavailable);
    }

    #[tokio::test]
    async fn test_cache_lookup_error_falls_through() {
        let store = Arc::new(MockCacheStore {
            fail_lookups: true,
            ..Default::default()
        });
        let orchestrator = RecoveryOrchestrator::new(store.clone());
        let invoked = Arc::new(AtomicBool::new(false));

        let result = orchestrator
            .recover(&unavailable(), "s1", Some(ok_fallback(invoked)), None)
            .await;

        assert_eq!(store.lookups.load(Ordering::SeqCst), 1);
        assert_eq!(result.recovery_method, RecoveryMethod::Fallback);
    }

    #[tokio::test]
    async fn test_disabled_stages_are_skipped() {
        let store = Arc::new(MockCacheStore::with_entry_aged("s1", Duration::from_secs(10)));
        let orchestrator = RecoveryOrchestrator::new(store.clone());
        let invoked = Arc::new(AtomicBool::new(false));

        let result = orchestrator
            .recover(
                &unavailable(),
                "s1",
                Some(ok_fallback(invoked.clone())),
                Some(RecoveryOptions {
                    use_cached_results: false,
                    fallback_to_alternate: false,
                    ..Default::default()
                }),
            )
            .await;

        assert_eq!(result.recovery_method, RecoveryMethod::Degraded);
        assert_eq!(store.lookups.load(Ordering::SeqCst), 0);
        assert!(!invoked.load(Ordering::SeqCst));
    }

    // =========================================================================
    // Messages
    // =========================================================================

    #[tokio::test]
    async fn test_human_message_merged_when_enabled() {
        let orchestrator = RecoveryOrchestrator::new(Arc::new(MockCacheStore::default()));
        let error: Error = ServiceError::RateLimited {
            message: "429".into(),
            retry_after_secs: Some(30),
        }
        .into();

        let result = orchestrator.recover(&error, "s1", None, None).await;

        let message = result.message.clone().unwrap();
        assert!(message.contains("too many requests"));
        assert!(result.explanation.ends_with(&message));
        assert_eq!(result.metadata["userMessage"], json!(message));
        // Raw error text stays out of user-facing fields.
        assert!(!message.contains("429"));
    }

    #[tokio::test]
    async fn test_human_message_omitted_when_disabled() {
        let orchestrator = RecoveryOrchestrator::new(Arc::new(MockCacheStore::default()));

        let result = orchestrator
            .recover(
                &unavailable(),
                "s1",
                None,
                Some(RecoveryOptions {
                    include_human_message: false,
                    ..Default::default()
                }),
            )
            .await;

        assert!(result.message.is_none());
        assert!(!result.metadata.contains_key("userMessage"));
    }

    // =========================================================================
    // Classification
    // =========================================================================

    #[test]
    fn test_is_recoverable_by_category() {
        let orchestrator = RecoveryOrchestrator::new(Arc::new(MockCacheStore::default()));

        assert!(orchestrator.is_recoverable(&unavailable()));
        assert!(orchestrator.is_recoverable(&ServiceError::Timeout("t".into()).into()));
        assert!(orchestrator.is_recoverable(&CircuitOpenError::cooling_down("ai-service", None).into()));
        assert!(!orchestrator.is_recoverable(&ServiceError::Provider("bad json".into()).into()));
        assert!(!orchestrator.is_recoverable(&Error::Unexpected("boom".into())));
    }

    #[test]
    fn test_get_suggestions_generic_for_unknown() {
        let orchestrator = RecoveryOrchestrator::new(Arc::new(MockCacheStore::default()));
        let generic = orchestrator.get_suggestions(&Error::Unexpected("boom".into()));
        assert_eq!(generic, suggestions(ErrorCategory::Unknown));
        let timeout = orchestrator.get_suggestions(&ServiceError::Timeout("t".into()).into());
        assert_ne!(timeout, generic);
    }

    // =========================================================================
    // execute_with_recovery
    // =========================================================================

    #[tokio::test]
    async fn test_execute_with_recovery_passes_success_through() {
        let orchestrator = RecoveryOrchestrator::new(Arc::new(MockCacheStore::default()));

        let result = orchestrator
            .execute_with_recovery("s1", || async { Ok::<_, Error>(json!(["live"])) }, None, None)
            .await
            .unwrap();

        assert_eq!(result.recovery_method, RecoveryMethod::None);
        assert_eq!(result.payload, json!(["live"]));
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_execute_with_recovery_recovers_recoverable_errors() {
        let store = Arc::new(MockCacheStore::with_entry_aged("s1", Duration::from_secs(60)));
        let orchestrator = RecoveryOrchestrator::new(store);

        let result = orchestrator
            .execute_with_recovery("s1", || async { Err::<Value, Error>(unavailable()) }, None, None)
            .await
            .unwrap();

        assert_eq!(result.recovery_method, RecoveryMethod::Cache);
    }

    #[tokio::test]
    async fn test_execute_with_recovery_propagates_unknown_errors() {
        let store = Arc::new(MockCacheStore::with_entry_aged("s1", Duration::from_secs(60)));
        let orchestrator = RecoveryOrchestrator::new(store.clone());

        let err = orchestrator
            .execute_with_recovery(
                "s1",
                || async {
                    Err::<Value, Error>(ServiceError::Provider("invalid request".into()).into())
                },
                None,
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Service(ServiceError::Provider(_))));
        assert_eq!(store.lookups.load(Ordering::SeqCst), 0);
    }
}
