//! Retry-with-backoff delivery of outbound notifications.
//!
//! - **Models** (`model.rs`) - Retry configuration, attempt records, stats
//! - **Traits** (`traits.rs`) - Durable attempt telemetry store
//! - **Backoff** (`backoff.rs`) - Exponential delay with jitter
//! - **Executor** (`executor.rs`) - The retry loop
//! - **Channels** (`channels.rs`) - Email/SMS/push/webhook wrappers
//!
//! Every attempt is written to the [`RetryAttemptStore`] before the executor
//! sleeps, so a crash mid-sequence leaves an accurate attempt count behind.

pub mod backoff;
pub mod channels;
pub mod errors;
pub mod executor;
pub mod model;
pub mod traits;

pub use backoff::{backoff_delay, random_jitter, MAX_JITTER};
pub use errors::{DeliveryError, RetryExhaustedError};
pub use executor::RetryExecutor;
pub use model::{DeliveryChannel, RetryAttemptRecord, RetryConfig, RetryStats};
pub use traits::RetryAttemptStore;
