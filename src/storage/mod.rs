//! Storage Module
//!
//! Persistent key-value store contract consumed by the multi-level and
//! write-through caches, plus an in-memory implementation.

mod memory;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::StorageError;

pub use memory::MemoryStore;

/// Result type for store operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// == Key Value Store ==
/// Async string key-value store.
///
/// Values are opaque UTF-8 strings; callers own any encoding.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn read(&self, key: &str) -> StorageResult<Option<String>>;

    async fn write(&self, key: &str, value: String) -> StorageResult<()>;

    async fn remove(&self, key: &str) -> StorageResult<()>;

    async fn keys(&self) -> StorageResult<Vec<String>>;

    async fn clear(&self) -> StorageResult<()>;

    async fn contains_key(&self, key: &str) -> StorageResult<bool> {
        Ok(self.read(key).await?.is_some())
    }

    /// Releases resources. Later calls fail with [`StorageError::Disposed`].
    async fn dispose(&self) -> StorageResult<()>;
}

// == Batch Operation ==
/// One step of an all-or-nothing batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    Write { key: String, value: String },
    Remove { key: String },
}

impl BatchOperation {
    pub fn write(key: impl Into<String>, value: impl Into<String>) -> Self {
        BatchOperation::Write {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn remove(key: impl Into<String>) -> Self {
        BatchOperation::Remove { key: key.into() }
    }

    pub fn key(&self) -> &str {
        match self {
            BatchOperation::Write { key, .. } | BatchOperation::Remove { key } => key,
        }
    }
}

// == Store Event ==
/// Change notification published to store observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Written(String),
    Removed(String),
    Cleared,
}

// == Storage Stats ==
/// Per-store operation counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    pub reads: u64,
    pub writes: u64,
    pub removes: u64,
}
