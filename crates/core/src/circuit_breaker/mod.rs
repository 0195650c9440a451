//! Per-resource circuit breakers for calls into the AI dependency.
//!
//! Each named resource owns an independent circuit with three states:
//!
//! - **Closed**: Normal operation, calls run directly.
//! - **Open**: The resource is failing, calls are rejected without running.
//! - **HalfOpen**: A bounded number of trial calls probe for recovery.
//!
//! ```text
//! Closed ──[failure_threshold failures]──> Open
//!   ▲                                        │
//!   │                                        │ [next call after recovery_timeout]
//!   │                                        ▼
//!   └────────────[any success]─────────── HalfOpen
//!                  [any failure] ─────────> Open
//! ```
//!
//! The Open → HalfOpen transition is evaluated lazily against the wall clock
//! when a call arrives; no timers are kept per circuit.

pub mod errors;
pub mod model;
pub mod registry;

pub use errors::{CircuitOpenError, RejectionReason};
pub use model::{CircuitBreakerConfig, CircuitState, CircuitStatus};
pub use registry::CircuitBreakerRegistry;
