//! Velox Cache Module
//!
//! Combined LRU + TTL cache with tagging, bulk operations,
//! stale-while-revalidate reads and a change-event stream.

use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::entry::{current_timestamp_ms, duration_ms};
use crate::cache::{AccessOrder, CacheEntry, CacheEvent, CacheEventKind, CacheStats, EventBus};
use crate::config::CacheConfig;
use crate::error::Result;

/// Mutable state guarded by the cache lock.
#[derive(Debug)]
struct Inner<T> {
    entries: HashMap<String, CacheEntry<T>>,
    order: AccessOrder,
    stats: CacheStats,
    /// Keys with a background refresh in flight
    refreshing: HashSet<String>,
}

// == Velox Cache ==
/// Size-bounded cache where every entry expires.
///
/// `VeloxCache` is a cheap handle: clones share the same entries, stats
/// and event stream. The lock is never held across an `.await`, so every
/// synchronous operation is atomic with respect to the others.
pub struct VeloxCache<T> {
    inner: Arc<Mutex<Inner<T>>>,
    events: EventBus,
    max_size: usize,
    default_ttl: Duration,
    stale_tolerance: Duration,
    cleanup_interval: Duration,
}

impl<T> Clone for VeloxCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            events: self.events.clone(),
            max_size: self.max_size,
            default_ttl: self.default_ttl,
            stale_tolerance: self.stale_tolerance,
            cleanup_interval: self.cleanup_interval,
        }
    }
}

impl<T> std::fmt::Debug for VeloxCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VeloxCache")
            .field("max_size", &self.max_size)
            .field("default_ttl", &self.default_ttl)
            .field("stale_tolerance", &self.stale_tolerance)
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + 'static> VeloxCache<T> {
    // == Constructor ==
    /// Creates a cache with the given capacity and default TTL.
    ///
    /// Returns `InvalidConfig` when `max_size` is zero.
    pub fn new(max_size: usize, default_ttl: Duration) -> Result<Self> {
        Self::from_config(&CacheConfig {
            max_size,
            default_ttl,
            ..CacheConfig::default()
        })
    }

    /// Creates a cache from a [`CacheConfig`].
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                order: AccessOrder::new(),
                stats: CacheStats::new(),
                refreshing: HashSet::new(),
            })),
            events: EventBus::new(),
            max_size: config.max_size,
            default_ttl: config.default_ttl,
            stale_tolerance: config.stale_tolerance,
            cleanup_interval: config.cleanup_interval,
        })
    }

    /// Variant of [`VeloxCache::new`] that also sets the stale tolerance.
    pub fn with_stale_tolerance(
        max_size: usize,
        default_ttl: Duration,
        stale_tolerance: Duration,
    ) -> Result<Self> {
        Self::from_config(&CacheConfig {
            max_size,
            default_ttl,
            stale_tolerance,
            ..CacheConfig::default()
        })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Starts the background expiry sweeper at the configured interval.
    ///
    /// Abort the returned handle on shutdown.
    pub fn spawn_cleanup(&self) -> JoinHandle<()> {
        crate::tasks::spawn_cleanup_task(self.clone(), self.cleanup_interval)
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, kind: CacheEventKind, key: &str) {
        self.events.publish(CacheEvent::keyed(kind, key));
    }

    /// Removes an expired entry, recording the expiration.
    fn expire(&self, inner: &mut Inner<T>, key: &str) {
        inner.entries.remove(key);
        inner.order.remove(key);
        inner.stats.record_expiration();
        debug!(key = %key, "Cache entry expired");
        self.emit(CacheEventKind::Expired, key);
    }

    fn sweep_expired(&self, inner: &mut Inner<T>) -> usize {
        let now = current_timestamp_ms();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.expire(inner, key);
        }
        expired.len()
    }

    // == Get ==
    /// Returns the value for `key` if present and not expired.
    ///
    /// Expired entries are removed and counted as a miss.
    pub fn get(&self, key: &str) -> Option<T> {
        let mut inner = self.lock();
        let expired = match inner.entries.get(key) {
            None => {
                inner.stats.record_miss();
                self.emit(CacheEventKind::Miss, key);
                return None;
            }
            Some(entry) => entry.is_expired(),
        };

        if expired {
            self.expire(&mut inner, key);
            inner.stats.record_miss();
            self.emit(CacheEventKind::Miss, key);
            return None;
        }

        let value = inner.entries.get_mut(key).map(|entry| {
            entry.touch();
            entry.value.clone()
        });
        inner.order.touch(key);
        inner.stats.record_hit();
        self.emit(CacheEventKind::Hit, key);
        value
    }

    /// Returns the live value for `key` without touching it or counting a lookup.
    pub fn peek(&self, key: &str) -> Option<T> {
        let inner = self.lock();
        inner
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone())
    }

    /// Returns a copy of the entry metadata for `key`, expired or not.
    pub fn entry(&self, key: &str) -> Option<CacheEntry<T>> {
        self.lock().entries.get(key).cloned()
    }

    // == Put ==
    /// Stores `value` under the default TTL with no tags.
    pub fn put(&self, key: &str, value: T) {
        self.insert(key, value, None, HashSet::new());
    }

    /// Stores `value` with an optional TTL override and tags.
    pub fn put_with(&self, key: &str, value: T, ttl: Option<Duration>, tags: &[&str]) {
        let tags = tags.iter().map(|t| t.to_string()).collect();
        self.insert(key, value, ttl, tags);
    }

    fn insert(&self, key: &str, value: T, ttl: Option<Duration>, tags: HashSet<String>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let mut inner = self.lock();

        if !inner.entries.contains_key(key) && inner.entries.len() >= self.max_size {
            self.sweep_expired(&mut inner);
            if inner.entries.len() >= self.max_size {
                if let Some(victim) = inner.order.oldest().map(str::to_string) {
                    inner.entries.remove(&victim);
                    inner.order.remove(&victim);
                    inner.stats.record_eviction();
                    debug!(key = %victim, "Evicted least recently used entry");
                    self.emit(CacheEventKind::Evicted, &victim);
                }
            }
        }

        inner
            .entries
            .insert(key.to_string(), CacheEntry::with_tags(key, value, Some(ttl), tags));
        inner.order.touch(key);
        inner.stats.record_write();
        self.emit(CacheEventKind::Put, key);
    }

    // == Remove ==
    /// Removes `key`, returning its value if it was present and live.
    ///
    /// An expired entry is purged as an expiration and yields None.
    pub fn remove(&self, key: &str) -> Option<T> {
        let mut inner = self.lock();
        if inner.entries.get(key)?.is_expired() {
            self.expire(&mut inner, key);
            return None;
        }
        let removed = inner.entries.remove(key)?;
        inner.order.remove(key);
        self.emit(CacheEventKind::Removed, key);
        Some(removed.value)
    }

    /// Returns true if `key` holds a live entry, purging it if expired.
    pub fn contains_key(&self, key: &str) -> bool {
        let mut inner = self.lock();
        match inner.entries.get(key).map(|entry| entry.is_expired()) {
            Some(true) => {
                self.expire(&mut inner, key);
                false
            }
            Some(false) => true,
            None => false,
        }
    }

    /// Lists live keys after purging expired entries.
    pub fn keys(&self) -> Vec<String> {
        let mut inner = self.lock();
        self.sweep_expired(&mut inner);
        inner.entries.keys().cloned().collect()
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        let count = inner.entries.len();
        inner.entries.clear();
        inner.order.clear();
        info!(count, "Cache cleared");
        self.events.publish(CacheEvent::cleared());
    }

    /// Current number of stored entries, including expired ones not yet purged.
    pub fn size(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    // == Remove Expired ==
    /// Purges every expired entry, returning how many were removed.
    pub fn remove_expired(&self) -> usize {
        let mut inner = self.lock();
        self.sweep_expired(&mut inner)
    }

    /// Returns the cached value or stores the result of `compute`.
    ///
    /// `compute` runs at most once and only when no live value exists.
    pub fn get_or_put<F>(&self, key: &str, compute: F) -> T
    where
        F: FnOnce() -> T,
    {
        if let Some(value) = self.get(key) {
            return value;
        }
        let value = compute();
        self.put(key, value.clone());
        value
    }

    // == Tags ==
    /// Removes every entry carrying `tag`, returning how many were removed.
    pub fn invalidate_by_tag(&self, tag: &str) -> usize {
        self.invalidate_by_tags(&[tag])
    }

    /// Removes every live entry carrying any of `tags`.
    ///
    /// Expired entries are purged first and count as expirations, not removals.
    pub fn invalidate_by_tags(&self, tags: &[&str]) -> usize {
        let mut inner = self.lock();
        self.sweep_expired(&mut inner);
        let matched: Vec<String> = inner
            .entries
            .values()
            .filter(|entry| tags.iter().any(|tag| entry.has_tag(tag)))
            .map(|entry| entry.key.clone())
            .collect();

        for key in &matched {
            inner.entries.remove(key);
            inner.order.remove(key);
            self.emit(CacheEventKind::Removed, key);
        }
        debug!(?tags, removed = matched.len(), "Invalidated entries by tag");
        matched.len()
    }

    /// Lists live keys whose entries carry `tag`.
    pub fn keys_by_tag(&self, tag: &str) -> Vec<String> {
        let mut inner = self.lock();
        self.sweep_expired(&mut inner);
        inner
            .entries
            .values()
            .filter(|entry| entry.has_tag(tag))
            .map(|entry| entry.key.clone())
            .collect()
    }

    // == Bulk Operations ==
    /// Stores every pair with a shared TTL and tag set.
    pub fn put_all<I>(&self, entries: I, ttl: Option<Duration>, tags: &[&str])
    where
        I: IntoIterator<Item = (String, T)>,
    {
        for (key, value) in entries {
            self.put_with(&key, value, ttl, tags);
        }
    }

    /// Looks up each key; missing or expired keys are omitted.
    pub fn get_all(&self, keys: &[&str]) -> HashMap<String, T> {
        keys.iter()
            .filter_map(|key| self.get(key).map(|value| (key.to_string(), value)))
            .collect()
    }

    /// Removes each key, returning the values that were present.
    pub fn remove_all(&self, keys: &[&str]) -> HashMap<String, T> {
        keys.iter()
            .filter_map(|key| self.remove(key).map(|value| (key.to_string(), value)))
            .collect()
    }

    // == Loading ==
    /// Cache-aside read: on miss or expiry, awaits `loader` and stores its result.
    ///
    /// Loader errors are returned unchanged and nothing is cached.
    pub async fn get_or_load<F, Fut, E>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        tags: &[&str],
        loader: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = loader().await?;
        self.put_with(key, value.clone(), ttl, tags);
        Ok(value)
    }

    // == Stale While Revalidate ==
    /// Serves a value that may be past its expiry.
    ///
    /// - missing: None
    /// - live: the value (a normal hit)
    /// - expired by no more than `stale_tolerance`: the stale value, while
    ///   `refresh` runs in the background and writes its result back under
    ///   the same tags. Refresh failures are logged and dropped.
    /// - expired beyond the tolerance: purged, None
    ///
    /// A `None` tolerance uses the configured one; a `None` ttl uses the
    /// default TTL for the refreshed value.
    pub async fn get_stale<F, Fut, E>(
        &self,
        key: &str,
        stale_tolerance: Option<Duration>,
        ttl: Option<Duration>,
        refresh: F,
    ) -> Option<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let tolerance = duration_ms(stale_tolerance.unwrap_or(self.stale_tolerance));
        let now = current_timestamp_ms();

        let (value, tags) = {
            let mut inner = self.lock();
            let (expires_at, expired) = match inner.entries.get(key) {
                None => {
                    inner.stats.record_miss();
                    self.emit(CacheEventKind::Miss, key);
                    return None;
                }
                Some(entry) => (entry.expires_at.unwrap_or(u64::MAX), entry.is_expired_at(now)),
            };

            if !expired {
                drop(inner);
                return self.get(key);
            }

            if now.saturating_sub(expires_at) > tolerance {
                self.expire(&mut inner, key);
                inner.stats.record_miss();
                self.emit(CacheEventKind::Miss, key);
                return None;
            }

            let stale = inner
                .entries
                .get(key)
                .map(|entry| (entry.value.clone(), entry.tags.clone()))?;
            inner.stats.record_hit();
            self.emit(CacheEventKind::Stale, key);

            if !inner.refreshing.insert(key.to_string()) {
                // A refresh for this key is already running
                return Some(stale.0);
            }
            stale
        };

        let cache = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            // The in-flight marker is cleared even when the refresh panics
            match AssertUnwindSafe(async move { refresh().await }).catch_unwind().await {
                Ok(Ok(fresh)) => {
                    debug!(key = %key, "Background refresh stored fresh value");
                    cache.insert(&key, fresh, ttl, tags);
                }
                Ok(Err(err)) => {
                    warn!(key = %key, error = %err, "Background refresh failed, stale value kept");
                }
                Err(_) => {
                    warn!(key = %key, "Background refresh panicked, stale value kept");
                }
            }
            cache.lock().refreshing.remove(&key);
        });

        Some(value)
    }

    // == Stats ==
    /// Returns a snapshot of the counters with the current entry count.
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let mut stats = inner.stats.clone();
        stats.set_total_entries(inner.entries.len());
        stats
    }

    pub fn reset_stats(&self) {
        self.lock().stats.reset();
    }

    /// Subscribes to change events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }
}
