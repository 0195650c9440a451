use std::fmt;
use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{Error, ErrorCategory, Result};
use crate::utils::time_utils::duration_ms;

/// Default maximum age of a cached payload accepted during recovery (1 hour).
pub const DEFAULT_MAX_CACHE_AGE: Duration = Duration::from_millis(3_600_000);

/// Caller-supplied alternate source, invoked at most once.
pub type FallbackFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<Value>> + Send>;

/// Wraps an async closure as a [`FallbackFn`].
pub fn fallback_fn<F, Fut>(f: F) -> FallbackFn
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Box::new(move || Box::pin(f()))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecoveryOptions {
    pub use_cached_results: bool,
    pub fallback_to_alternate: bool,
    #[serde(rename = "maxCacheAgeMs", with = "duration_ms")]
    pub max_cache_age: Duration,
    pub include_human_message: bool,
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        Self {
            use_cached_results: true,
            fallback_to_alternate: true,
            max_cache_age: DEFAULT_MAX_CACHE_AGE,
            include_human_message: true,
        }
    }
}

/// Which stage produced a [`RecoveryResult`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryMethod {
    Cache,
    Fallback,
    Degraded,
    /// The primary operation succeeded; no recovery took place.
    None,
}

impl RecoveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryMethod::Cache => "cache",
            RecoveryMethod::Fallback => "fallback",
            RecoveryMethod::Degraded => "degraded",
            RecoveryMethod::None => "none",
        }
    }
}

impl fmt::Display for RecoveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error that started recovery, reduced to what is safe to carry around.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggeringError {
    pub category: ErrorCategory,
    pub message: String,
}

impl From<&Error> for TriggeringError {
    fn from(error: &Error) -> Self {
        Self {
            category: error.category(),
            message: error.to_string(),
        }
    }
}

/// Outcome of recovery. Never an error: callers branch on `recovery_method`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryResult {
    pub payload: Value,
    pub recovery_method: RecoveryMethod,
    /// Human-readable message, when enabled.
    pub message: Option<String>,
    pub explanation: String,
    pub metadata: Map<String, Value>,
    pub error: Option<TriggeringError>,
}

impl RecoveryResult {
    /// Result for a primary call that succeeded.
    pub fn primary(payload: Value) -> Self {
        Self {
            payload,
            recovery_method: RecoveryMethod::None,
            message: None,
            explanation: String::new(),
            metadata: Map::new(),
            error: None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.recovery_method == RecoveryMethod::Degraded
    }
}
