//! Cache Module
//!
//! In-memory caches with LRU, LFU and TTL eviction, the combined
//! [`VeloxCache`], and the multi-level and write-through compositions
//! backed by a persistent store.

mod entry;
mod envelope;
mod events;
mod lfu;
mod lru;
mod multi_level;
mod order;
mod policy;
mod stats;
mod ttl;
mod velox;
mod write_through;


// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry};
pub use envelope::{Codec, DeserializeFn, Envelope, SerializeFn};
pub use events::{CacheEvent, CacheEventKind, EventBus, EVENT_CHANNEL_CAPACITY};
pub use lfu::LfuCache;
pub use lru::LruCache;
pub use multi_level::MultiLevelCache;
pub use order::AccessOrder;
pub use policy::CachePolicy;
pub use stats::CacheStats;
pub use ttl::TtlCache;
pub use velox::VeloxCache;
pub use write_through::WriteThroughCache;
