//! Velox Cache - caching and resilience primitives
//!
//! Provides LRU/LFU/TTL caches, a tagged stale-while-revalidate cache, a
//! two-level memory + persistent cascade, and a circuit breaker, request
//! queue and HTTP response cache for protecting downstream resources.

pub mod cache;
pub mod config;
pub mod error;
pub mod network;
pub mod storage;
pub mod tasks;

pub use cache::{CachePolicy, CacheStats, MultiLevelCache, VeloxCache, WriteThroughCache};
pub use config::VeloxConfig;
pub use error::{BreakerError, QueueError, Result, StorageError, VeloxError};
pub use network::{CacheInterceptor, CircuitBreaker, CircuitState, RequestQueue};
pub use storage::{KeyValueStore, MemoryStore};
pub use tasks::spawn_cleanup_task;
