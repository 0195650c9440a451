//! Staged recovery from AI dependency failures.
//!
//! When the primary recommendation call fails with a recoverable error the
//! orchestrator tries, in order:
//!
//! 1. a cached payload computed within `max_cache_age`,
//! 2. the caller's fallback source,
//! 3. a degraded empty payload, which always succeeds.
//!
//! Errors outside the recoverable categories are never orchestrated.

pub mod messages;
pub mod model;
pub mod orchestrator;

pub use messages::{human_message, suggestions};
pub use model::{
    fallback_fn, FallbackFn, RecoveryMethod, RecoveryOptions, RecoveryResult, TriggeringError,
    DEFAULT_MAX_CACHE_AGE,
};
pub use orchestrator::RecoveryOrchestrator;
