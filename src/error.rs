//! Error types for the cache and resilience primitives
//!
//! Provides unified error handling using thiserror.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

// == Velox Error Enum ==
/// Unified error type for cache construction and persistence.
#[derive(Error, Debug)]
pub enum VeloxError {
    /// Configuration violates a construction contract
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Persistent store operation failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Value could not be encoded for the persistent tier
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// == Storage Error Enum ==
/// Errors raised by a [`crate::storage::KeyValueStore`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The backing medium rejected the operation
    #[error("I/O failure on key '{key}': {message}")]
    Io { key: String, message: String },

    /// The store was disposed and no longer accepts operations
    #[error("Store has been disposed")]
    Disposed,

    /// A batch failed and every applied operation was rolled back
    #[error("Batch failed at operation {index} and was rolled back: {source}")]
    BatchFailed {
        index: usize,
        #[source]
        source: Box<StorageError>,
    },
}

// == Breaker Error Enum ==
/// Outcome of a call rejected or failed through a circuit breaker.
#[derive(Error, Debug)]
pub enum BreakerError<E> {
    /// Circuit is open; the action was not invoked
    #[error("Circuit open since {opened_at}, retry after {recovery_timeout:?}")]
    Open {
        opened_at: DateTime<Utc>,
        recovery_timeout: Duration,
    },

    /// The action ran and returned an error
    #[error("Action failed: {0}")]
    Failed(E),
}

impl<E> BreakerError<E> {
    /// Returns true if the call was rejected without running the action.
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }
}

// == Queue Error Enum ==
/// Outcome of an action submitted to a [`crate::network::RequestQueue`].
#[derive(Error, Debug)]
pub enum QueueError<E> {
    /// The queue was disposed before the action started
    #[error("Request queue disposed")]
    Disposed,

    /// The dispatched action was dropped without reporting a result
    #[error("Queued action dropped before completion")]
    Dropped,

    /// The action ran and returned an error
    #[error("Queued action failed: {0}")]
    Failed(E),
}

impl<E> QueueError<E> {
    /// Returns true if the action never started because of disposal.
    pub fn is_disposed(&self) -> bool {
        matches!(self, QueueError::Disposed)
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, VeloxError>;
