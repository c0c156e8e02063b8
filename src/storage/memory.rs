//! In-Memory Store
//!
//! HashMap-backed [`KeyValueStore`] with observers, statistics and
//! transactional batches.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

use super::{BatchOperation, KeyValueStore, StorageResult, StorageStats, StoreEvent};
use crate::error::StorageError;

const OBSERVER_CHANNEL_CAPACITY: usize = 128;

// == Memory Store ==
/// Thread-safe in-memory store.
#[derive(Debug)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, String>>,
    events: broadcast::Sender<StoreEvent>,
    disposed: AtomicBool,
    fail_writes: AtomicBool,
    reads: AtomicU64,
    writes: AtomicU64,
    removes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(OBSERVER_CHANNEL_CAPACITY);
        Self {
            data: RwLock::new(HashMap::new()),
            events,
            disposed: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            removes: AtomicU64::new(0),
        }
    }

    /// Makes every subsequent write fail with an I/O error until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Subscribes to changes committed after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
        }
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(StorageError::Disposed);
        }
        Ok(())
    }

    fn check_writable(&self, key: &str) -> StorageResult<()> {
        self.ensure_open()?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Io {
                key: key.to_string(),
                message: "write rejected".to_string(),
            });
        }
        Ok(())
    }

    fn notify(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }

    // == Batch ==
    /// Applies `operations` in order as a single unit.
    ///
    /// If any operation fails, the store is restored to its pre-batch
    /// contents and `BatchFailed` reports the failing index. Observers only
    /// see events for committed batches.
    pub async fn batch(&self, operations: Vec<BatchOperation>) -> StorageResult<()> {
        self.ensure_open()?;
        let mut data = self.data.write().await;
        let snapshot = data.clone();

        for (index, op) in operations.iter().enumerate() {
            let applied = match op {
                BatchOperation::Write { key, value } => self
                    .check_writable(key)
                    .map(|_| {
                        data.insert(key.clone(), value.clone());
                    }),
                BatchOperation::Remove { key } => self.ensure_open().map(|_| {
                    data.remove(key);
                }),
            };

            if let Err(source) = applied {
                *data = snapshot;
                warn!(index, key = %op.key(), "Batch failed, rolled back");
                return Err(StorageError::BatchFailed {
                    index,
                    source: Box::new(source),
                });
            }
        }
        drop(data);

        for op in operations {
            match op {
                BatchOperation::Write { key, .. } => {
                    self.writes.fetch_add(1, Ordering::Relaxed);
                    self.notify(StoreEvent::Written(key));
                }
                BatchOperation::Remove { key } => {
                    self.removes.fetch_add(1, Ordering::Relaxed);
                    self.notify(StoreEvent::Removed(key));
                }
            }
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn read(&self, key: &str) -> StorageResult<Option<String>> {
        self.ensure_open()?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn write(&self, key: &str, value: String) -> StorageResult<()> {
        self.check_writable(key)?;
        self.data.write().await.insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.notify(StoreEvent::Written(key.to_string()));
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.ensure_open()?;
        if self.data.write().await.remove(key).is_some() {
            self.removes.fetch_add(1, Ordering::Relaxed);
            self.notify(StoreEvent::Removed(key.to_string()));
        }
        Ok(())
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self.data.read().await.keys().cloned().collect())
    }

    async fn clear(&self) -> StorageResult<()> {
        self.ensure_open()?;
        self.data.write().await.clear();
        self.notify(StoreEvent::Cleared);
        Ok(())
    }

    async fn contains_key(&self, key: &str) -> StorageResult<bool> {
        self.ensure_open()?;
        Ok(self.data.read().await.contains_key(key))
    }

    async fn dispose(&self) -> StorageResult<()> {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.data.write().await.clear();
            debug!("Memory store disposed");
        }
        Ok(())
    }
}
