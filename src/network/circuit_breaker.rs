//! Circuit Breaker Module
//!
//! Three-state failure isolation gate around asynchronous actions.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::BreakerConfig;
use crate::error::{BreakerError, Result};

// == Circuit State ==
/// Breaker state with the data that only exists in that state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through
    Closed,
    /// Calls are rejected until the recovery timeout elapses
    Open { opened_at: DateTime<Utc> },
    /// Probe calls pass through; `success_count` counts successful probes
    HalfOpen { success_count: u32 },
}

impl CircuitState {
    pub fn name(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open { .. } => "open",
            CircuitState::HalfOpen { .. } => "half_open",
        }
    }

    fn same_phase(&self, other: &CircuitState) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Callback invoked with `(from, to)` on every state transition.
pub type StateChangeListener = Arc<dyn Fn(CircuitState, CircuitState) + Send + Sync>;

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
}

// == Circuit Breaker ==
/// Stops calling a failing dependency until it has had time to recover.
///
/// Every error returned by an action counts as a failure.
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    failure_threshold: u32,
    recovery_timeout: Duration,
    half_open_max_attempts: u32,
    on_state_change: Option<StateChangeListener>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("state", &self.state())
            .field("failure_threshold", &self.failure_threshold)
            .field("recovery_timeout", &self.recovery_timeout)
            .field("half_open_max_attempts", &self.half_open_max_attempts)
            .finish()
    }
}

impl CircuitBreaker {
    // == Constructor ==
    /// Creates a closed breaker. Zero thresholds are rejected.
    pub fn new(config: &BreakerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
            }),
            failure_threshold: config.failure_threshold,
            recovery_timeout: config.recovery_timeout,
            half_open_max_attempts: config.half_open_max_attempts,
            on_state_change: None,
        })
    }

    /// Registers a listener for state transitions.
    ///
    /// The listener runs synchronously under the breaker lock and must not
    /// call back into the breaker.
    pub fn on_state_change<F>(mut self, listener: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(listener));
        self
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state(), CircuitState::Open { .. })
    }

    /// Moves to `to`, notifying the listener if the phase changed.
    fn transition(&self, inner: &mut BreakerState, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        if from.same_phase(&to) {
            return;
        }
        match to {
            CircuitState::Open { .. } => {
                warn!(from = from.name(), failures = inner.failure_count, "Circuit opened")
            }
            _ => info!(from = from.name(), to = to.name(), "Circuit state changed"),
        }
        if let Some(listener) = &self.on_state_change {
            listener(from, to);
        }
    }

    fn open(&self, inner: &mut BreakerState) {
        self.transition(
            inner,
            CircuitState::Open {
                opened_at: Utc::now(),
            },
        );
    }

    /// Admits or rejects a call, moving open to half-open once the
    /// recovery timeout has elapsed.
    fn admit<E>(&self) -> std::result::Result<(), BreakerError<E>> {
        let mut inner = self.lock();
        if let CircuitState::Open { opened_at } = inner.state {
            let elapsed = (Utc::now() - opened_at).to_std().unwrap_or_default();
            if elapsed >= self.recovery_timeout {
                self.transition(&mut inner, CircuitState::HalfOpen { success_count: 0 });
            } else {
                return Err(BreakerError::Open {
                    opened_at,
                    recovery_timeout: self.recovery_timeout,
                });
            }
        }
        Ok(())
    }

    fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::HalfOpen { success_count } => {
                let success_count = success_count + 1;
                if success_count >= self.half_open_max_attempts {
                    inner.failure_count = 0;
                    self.transition(&mut inner, CircuitState::Closed);
                } else {
                    inner.state = CircuitState::HalfOpen { success_count };
                }
            }
            // Another caller reopened the circuit while this action ran
            CircuitState::Open { .. } => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.failure_threshold {
                    self.open(&mut inner);
                }
            }
            CircuitState::HalfOpen { .. } => self.open(&mut inner),
            CircuitState::Open { .. } => {}
        }
    }

    // == Execute ==
    /// Runs `action` through the breaker.
    ///
    /// Returns `BreakerError::Open` without invoking `action` while the
    /// circuit is open, and `BreakerError::Failed` when the action errors.
    pub async fn execute<F, Fut, T, E>(&self, action: F) -> std::result::Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        self.admit::<E>()?;
        match action().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(BreakerError::Failed(err))
            }
        }
    }

    // == Reset ==
    /// Force-closes the breaker and clears its counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.failure_count = 0;
        self.transition(&mut inner, CircuitState::Closed);
    }
}
