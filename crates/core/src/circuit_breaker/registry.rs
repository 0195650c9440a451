//! Registry of named circuits.
//!
//! The registry owns one circuit per resource name, created lazily on first
//! use. Each circuit sits behind its own mutex so that concurrent callers of
//! different resources never contend; the outer map lock is only held long
//! enough to look up or insert a circuit and is never held across an await.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use super::errors::CircuitOpenError;
use super::model::{CircuitBreakerConfig, CircuitState, CircuitStatus};
use crate::errors::{Error, Result};
use crate::utils::time_utils::add_duration;

/// Internal state for a single resource.
#[derive(Debug, Default)]
struct Circuit {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<DateTime<Utc>>,
    next_attempt_time: Option<DateTime<Utc>>,
    half_open_in_flight: u32,
    /// Bumped on every state transition. Outcomes admitted under an older
    /// epoch release their slot but never drive another transition.
    epoch: u64,
}

impl Circuit {
    fn transition(&mut self, state: CircuitState) {
        self.state = state;
        self.epoch = self.epoch.wrapping_add(1);
    }

    fn open(&mut self, now: DateTime<Utc>, config: &CircuitBreakerConfig) {
        self.transition(CircuitState::Open);
        self.next_attempt_time = Some(add_duration(now, config.recovery_timeout));
    }

    fn snapshot(&self, resource: &str) -> CircuitStatus {
        CircuitStatus {
            resource: resource.to_string(),
            state: self.state,
            failure_count: self.failure_count,
            last_failure_time: self.last_failure_time,
            next_attempt_time: self.next_attempt_time,
            half_open_in_flight: self.half_open_in_flight,
        }
    }
}

/// Lock a circuit mutex, recovering from poison if necessary.
///
/// The worst case of a poisoned circuit is a slightly wrong failure count,
/// which is better than taking down every caller of the resource.
fn lock_circuit(circuit: &Mutex<Circuit>) -> MutexGuard<'_, Circuit> {
    circuit.lock().unwrap_or_else(|poisoned| {
        warn!("Circuit mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Admission ticket for one call through a circuit.
///
/// Holding a half-open permit occupies one trial slot. The slot is released
/// in `Drop`, so it is returned on success, failure, panic, or when the
/// caller's future is dropped mid-flight.
struct CallPermit {
    resource: String,
    circuit: Arc<Mutex<Circuit>>,
    config: CircuitBreakerConfig,
    epoch: u64,
    holds_trial_slot: bool,
}

impl CallPermit {
    fn record_success(&self) {
        let mut circuit = lock_circuit(&self.circuit);
        if circuit.epoch != self.epoch {
            debug!(
                "Circuit breaker: ignoring late success for '{}' (circuit already moved to {})",
                self.resource, circuit.state
            );
            return;
        }

        match circuit.state {
            CircuitState::Closed => {
                if circuit.failure_count > 0 {
                    debug!(
                        "Circuit breaker: success for '{}', failure count reset",
                        self.resource
                    );
                }
                circuit.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                info!(
                    "Circuit breaker: closing circuit for '{}' after successful trial call",
                    self.resource
                );
                circuit.transition(CircuitState::Closed);
                circuit.failure_count = 0;
                circuit.next_attempt_time = None;
            }
            CircuitState::Open => {
                debug!(
                    "Circuit breaker: unexpected success for '{}' in Open state",
                    self.resource
                );
            }
        }
    }

    fn record_failure(&self, error: &Error) {
        let mut circuit = lock_circuit(&self.circuit);
        if circuit.epoch != self.epoch {
            debug!(
                "Circuit breaker: ignoring late failure for '{}' (circuit already moved to {})",
                self.resource, circuit.state
            );
            return;
        }

        let now = Utc::now();
        circuit.failure_count = circuit.failure_count.saturating_add(1);
        circuit.last_failure_time = Some(now);

        match circuit.state {
            CircuitState::Closed => {
                if circuit.failure_count >= self.config.failure_threshold {
                    warn!(
                        "Circuit breaker: opening circuit for '{}' after {} failures (last: {})",
                        self.resource, circuit.failure_count, error
                    );
                    circuit.open(now, &self.config);
                } else {
                    debug!(
                        "Circuit breaker: failure for '{}' ({}/{}): {}",
                        self.resource, circuit.failure_count, self.config.failure_threshold, error
                    );
                }
            }
            CircuitState::HalfOpen => {
                warn!(
                    "Circuit breaker: reopening circuit for '{}' after failed trial call: {}",
                    self.resource, error
                );
                circuit.open(now, &self.config);
            }
            CircuitState::Open => {
                debug!(
                    "Circuit breaker: additional failure for '{}' (already open)",
                    self.resource
                );
            }
        }
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if self.holds_trial_slot {
            let mut circuit = lock_circuit(&self.circuit);
            circuit.half_open_in_flight = circuit.half_open_in_flight.saturating_sub(1);
        }
    }
}

/// Per-resource circuit breaker registry.
///
/// Share it behind an `Arc` and pass it to the call sites that wrap the AI
/// dependency. State is in-memory and resets when the process restarts.
pub struct CircuitBreakerRegistry {
    circuits: Mutex<HashMap<String, Arc<Mutex<Circuit>>>>,
    default_config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    /// Create a registry with default settings.
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    /// Create a registry whose calls use `config` unless they pass their own.
    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            circuits: Mutex::new(HashMap::new()),
            default_config: config,
        }
    }

    pub fn default_config(&self) -> &CircuitBreakerConfig {
        &self.default_config
    }

    fn lock_circuits(&self) -> MutexGuard<'_, HashMap<String, Arc<Mutex<Circuit>>>> {
        self.circuits.lock().unwrap_or_else(|poisoned| {
            warn!("Circuit registry mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn circuit(&self, resource: &str) -> Arc<Mutex<Circuit>> {
        let mut circuits = self.lock_circuits();
        circuits
            .entry(resource.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Circuit::default())))
            .clone()
    }

    fn existing_circuit(&self, resource: &str) -> Option<Arc<Mutex<Circuit>>> {
        self.lock_circuits().get(resource).cloned()
    }

    /// Decide whether a call may run and reserve a trial slot if half-open.
    fn admit(
        &self,
        resource: &str,
        config: CircuitBreakerConfig,
    ) -> std::result::Result<CallPermit, CircuitOpenError> {
        let handle = self.circuit(resource);
        let mut circuit = lock_circuit(&handle);

        if circuit.state == CircuitState::Open {
            let now = Utc::now();
            match circuit.next_attempt_time {
                Some(next_attempt) if now < next_attempt => {
                    return Err(CircuitOpenError::cooling_down(resource, Some(next_attempt)));
                }
                _ => {
                    info!(
                        "Circuit breaker: transitioning '{}' from Open to HalfOpen",
                        resource
                    );
                    circuit.transition(CircuitState::HalfOpen);
                }
            }
        }

        let holds_trial_slot = match circuit.state {
            CircuitState::Closed => false,
            CircuitState::HalfOpen | CircuitState::Open => {
                if circuit.half_open_in_flight >= config.half_open_max_concurrent {
                    debug!(
                        "Circuit breaker: rejecting call to '{}', {} trial calls in flight",
                        resource, circuit.half_open_in_flight
                    );
                    return Err(CircuitOpenError::half_open_saturated(resource));
                }
                circuit.half_open_in_flight += 1;
                true
            }
        };

        let epoch = circuit.epoch;
        drop(circuit);

        Ok(CallPermit {
            resource: resource.to_string(),
            circuit: handle,
            config,
            epoch,
            holds_trial_slot,
        })
    }

    /// Run `operation` through the circuit for `resource`.
    ///
    /// Returns `Error::CircuitOpen` without invoking the operation when the
    /// circuit is open or every half-open trial slot is taken. Any error
    /// returned by the operation counts as a failure and is passed through.
    pub async fn execute<F, Fut, T>(
        &self,
        resource: &str,
        operation: F,
        config: Option<CircuitBreakerConfig>,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let config = config
            .unwrap_or_else(|| self.default_config.clone())
            .normalized();
        let permit = self.admit(resource, config)?;

        let outcome = operation().await;
        match &outcome {
            Ok(_) => permit.record_success(),
            Err(error) => permit.record_failure(error),
        }
        outcome
    }

    /// Get a snapshot of one circuit. Unknown resources report Closed/0.
    pub fn get_status(&self, resource: &str) -> CircuitStatus {
        match self.existing_circuit(resource) {
            Some(circuit) => lock_circuit(&circuit).snapshot(resource),
            None => CircuitStatus::closed(resource),
        }
    }

    /// Snapshots of every resource ever observed, sorted by name.
    pub fn get_all_statuses(&self) -> Vec<CircuitStatus> {
        let circuits: Vec<(String, Arc<Mutex<Circuit>>)> = self
            .lock_circuits()
            .iter()
            .map(|(name, circuit)| (name.clone(), circuit.clone()))
            .collect();

        let mut statuses: Vec<CircuitStatus> = circuits
            .iter()
            .map(|(name, circuit)| lock_circuit(circuit).snapshot(name))
            .collect();
        statuses.sort_by(|a, b| a.resource.cmp(&b.resource));
        statuses
    }

    /// Force a circuit back to Closed with a zero failure count.
    ///
    /// Unknown resources are ignored. Calls already in flight keep their
    /// trial slots until they finish, but their outcomes no longer move
    /// the circuit.
    pub fn reset(&self, resource: &str) {
        if let Some(handle) = self.existing_circuit(resource) {
            info!(
                "Circuit breaker: manually resetting circuit for '{}'",
                resource
            );
            let mut circuit = lock_circuit(&handle);
            circuit.transition(CircuitState::Closed);
            circuit.failure_count = 0;
            circuit.last_failure_time = None;
            circuit.next_attempt_time = None;
        }
    }

    /// Reset every known circuit to Closed.
    pub fn reset_all(&self) {
        let names: Vec<String> = self.lock_circuits().keys().cloned().collect();
        for name in &names {
            self.reset(name);
        }
        info!("Circuit breaker: all {} circuits reset", names.len());
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
