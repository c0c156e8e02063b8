//! Expiry Sweep Task
//!
//! Background task that periodically removes expired entries from a
//! shared [`VeloxCache`].

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::VeloxCache;

/// Spawns a background task that periodically purges expired entries.
///
/// Lookups already drop expired entries lazily; the sweeper keeps entries
/// that are never read again from holding capacity.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown.
///
/// # Example
/// ```ignore
/// let cache = VeloxCache::<String>::new(1000, Duration::from_secs(300))?;
/// let cleanup_handle = spawn_cleanup_task(cache.clone(), Duration::from_secs(1));
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task<T>(cache: VeloxCache<T>, interval: Duration) -> JoinHandle<()>
where
    T: Clone + Send + 'static,
{
    tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, "Starting cache expiry sweeper");

        loop {
            tokio::time::sleep(interval).await;

            let removed = cache.remove_expired();
            if removed > 0 {
                info!("Expiry sweep: removed {} expired entries", removed);
            } else {
                debug!("Expiry sweep: no expired entries found");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;

    #[tokio::test]
    async fn test_sweeper_removes_expired_entries() {
        let cache = VeloxCache::new(100, Duration::from_secs(300)).unwrap();
        cache.put_with("expire_soon", "value".to_string(), Some(Duration::from_millis(20)), &[]);
        cache.put("long_lived", "value".to_string());

        let handle = spawn_cleanup_task(cache.clone(), Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(cache.size(), 1, "Expired entry should have been swept");
        assert_eq!(cache.stats().expirations, 1);
        assert!(cache.peek("long_lived").is_some());

        handle.abort();
    }

    #[tokio::test]
    async fn test_spawn_cleanup_uses_configured_interval() {
        let cache = VeloxCache::from_config(&CacheConfig {
            max_size: 10,
            default_ttl: Duration::from_millis(10),
            cleanup_interval: Duration::from_millis(20),
            ..CacheConfig::default()
        })
        .unwrap();
        cache.put("short", 1u8);

        let handle = cache.spawn_cleanup();
        tokio::time::sleep(Duration::from_millis(70)).await;
        handle.abort();

        assert!(cache.is_empty());
        assert_eq!(cache.stats().expirations, 1);
    }

    #[tokio::test]
    async fn test_sweeper_can_be_aborted() {
        let cache = VeloxCache::<String>::new(10, Duration::from_secs(1)).unwrap();
        let handle = spawn_cleanup_task(cache, Duration::from_millis(10));

        handle.abort();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
