//! Background Tasks Module
//!
//! Contains background tasks that maintain caches between requests.
//!
//! # Tasks
//! - Expiry sweep: Removes expired cache entries at configured intervals

mod cleanup;

pub use cleanup::spawn_cleanup_task;
