//! TTL Cache Module
//!
//! Unbounded cache whose entries expire after a time-to-live.

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use crate::cache::entry::current_timestamp_ms;
use crate::cache::{CacheEntry, CachePolicy};

// == TTL Cache ==
/// Cache that drops entries once their TTL elapses.
///
/// Expired entries are purged lazily on `get`, `contains_key` and `keys`,
/// or eagerly through [`TtlCache::remove_expired`]. There is no size bound.
#[derive(Debug)]
pub struct TtlCache<T> {
    entries: HashMap<String, CacheEntry<T>>,
    default_ttl: Duration,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            default_ttl,
        }
    }

    /// Stores `value` with a per-entry TTL override.
    pub fn put_with_ttl(&mut self, key: &str, value: T, ttl: Duration) {
        self.entries
            .insert(key.to_string(), CacheEntry::new(key, value, Some(ttl)));
    }

    // == Remove Expired ==
    /// Purges every expired entry, returning how many were removed.
    pub fn remove_expired(&mut self) -> usize {
        let now = current_timestamp_ms();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, "TTL cache purged expired entries");
        }
        removed
    }

    /// Drops `key` if it has expired, returning true when it was live.
    fn purge_if_expired(&mut self, key: &str) -> bool {
        match self.entries.get(key) {
            Some(entry) if entry.is_expired() => {
                self.entries.remove(key);
                false
            }
            Some(_) => true,
            None => false,
        }
    }
}

impl<T: Clone> CachePolicy<T> for TtlCache<T> {
    fn get(&mut self, key: &str) -> Option<T> {
        if !self.purge_if_expired(key) {
            return None;
        }
        let entry = self.entries.get_mut(key)?;
        entry.touch();
        Some(entry.value.clone())
    }

    fn put(&mut self, key: &str, value: T) {
        let ttl = self.default_ttl;
        self.put_with_ttl(key, value, ttl);
    }

    fn remove(&mut self, key: &str) -> Option<T> {
        self.entries.remove(key).map(|e| e.value)
    }

    fn contains_key(&mut self, key: &str) -> bool {
        self.purge_if_expired(key)
    }

    fn keys(&mut self) -> Vec<String> {
        self.remove_expired();
        self.entries.keys().cloned().collect()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_put_and_get_before_expiry() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        cache.put("a", 1);
        assert_eq!(cache.get("a"), Some(1));
        assert!(cache.contains_key("a"));
    }

    #[test]
    fn test_zero_ttl_expires() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        cache.put_with_ttl("k", "v", Duration::ZERO);

        sleep(Duration::from_millis(2));

        assert_eq!(cache.get("k"), None);
        assert!(!cache.keys().contains(&"k".to_string()));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_contains_key_purges_expired() {
        let mut cache = TtlCache::new(Duration::from_millis(20));
        cache.put("k", 1);

        sleep(Duration::from_millis(40));

        assert!(!cache.contains_key("k"));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_remove_expired_counts() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        cache.put_with_ttl("short", 1, Duration::from_millis(10));
        cache.put("long", 2);

        sleep(Duration::from_millis(30));

        assert_eq!(cache.remove_expired(), 1);
        assert_eq!(cache.keys(), vec!["long".to_string()]);
    }

    #[test]
    fn test_get_or_put_recomputes_after_expiry() {
        let mut cache = TtlCache::new(Duration::from_millis(10));
        assert_eq!(cache.get_or_put("k", || 1), 1);
        assert_eq!(cache.get_or_put("k", || 2), 1);

        sleep(Duration::from_millis(30));

        assert_eq!(cache.get_or_put("k", || 3), 3);
    }
}
