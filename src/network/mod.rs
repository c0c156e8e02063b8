//! Network Module
//!
//! Resilience primitives for protecting a downstream resource, and an HTTP
//! response cache for client or server pipelines.

mod circuit_breaker;
mod interceptor;
mod request_queue;

pub use circuit_breaker::{CircuitBreaker, CircuitState, StateChangeListener};
pub use interceptor::{
    cache_middleware, default_cache_key, CacheInterceptor, CachedResponse, KeyStrategy,
    CACHE_STATUS_HEADER,
};
pub use request_queue::RequestQueue;
