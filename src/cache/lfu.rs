//! LFU Cache Module
//!
//! Size-bounded cache that evicts the least frequently used entry.

use std::collections::HashMap;

use tracing::debug;

use crate::cache::{AccessOrder, CacheEntry, CachePolicy};
use crate::error::{Result, VeloxError};

// == LFU Cache ==
/// Size-bounded cache with least-frequently-used eviction.
///
/// The victim is the entry with the smallest access count; ties go to the
/// entry accessed longest ago.
#[derive(Debug)]
pub struct LfuCache<T> {
    entries: HashMap<String, CacheEntry<T>>,
    order: AccessOrder,
    max_size: usize,
}

impl<T: Clone> LfuCache<T> {
    /// Creates a cache holding at most `max_size` entries.
    pub fn new(max_size: usize) -> Result<Self> {
        if max_size == 0 {
            return Err(VeloxError::InvalidConfig(
                "LFU cache max_size must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            entries: HashMap::new(),
            order: AccessOrder::new(),
            max_size,
        })
    }

    /// Returns how many times `key` has been read.
    pub fn access_count(&self, key: &str) -> Option<u64> {
        self.entries.get(key).map(|e| e.access_count)
    }

    fn evict_lfu(&mut self) {
        let Some(min_count) = self.entries.values().map(|e| e.access_count).min() else {
            return;
        };
        let entries = &self.entries;
        let victim = self
            .order
            .oldest_where(|k| entries.get(k).is_some_and(|e| e.access_count == min_count))
            .map(str::to_string);

        if let Some(victim) = victim {
            self.entries.remove(&victim);
            self.order.remove(&victim);
            debug!(key = %victim, access_count = min_count, "LFU eviction");
        }
    }
}

impl<T: Clone> CachePolicy<T> for LfuCache<T> {
    fn get(&mut self, key: &str) -> Option<T> {
        let entry = self.entries.get_mut(key)?;
        entry.touch();
        self.order.touch(key);
        Some(entry.value.clone())
    }

    fn put(&mut self, key: &str, value: T) {
        match self.entries.get_mut(key) {
            // Overwrites keep the accumulated frequency
            Some(entry) => entry.value = value,
            None => {
                if self.entries.len() >= self.max_size {
                    self.evict_lfu();
                }
                self.entries
                    .insert(key.to_string(), CacheEntry::new(key, value, None));
                self.order.touch(key);
            }
        }
    }

    fn remove(&mut self, key: &str) -> Option<T> {
        self.order.remove(key);
        self.entries.remove(key).map(|e| e.value)
    }

    fn contains_key(&mut self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn keys(&mut self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(LfuCache::<u32>::new(0).is_err());
    }

    #[test]
    fn test_evicts_least_frequently_used() {
        let mut cache = LfuCache::new(2).unwrap();
        cache.put("A", 1);
        cache.put("B", 2);
        cache.get("A");
        cache.get("A");
        cache.get("B");

        cache.put("C", 3);

        assert!(cache.contains_key("A"));
        assert!(!cache.contains_key("B"));
        assert!(cache.contains_key("C"));
    }

    #[test]
    fn test_tie_broken_by_oldest_access() {
        let mut cache = LfuCache::new(3).unwrap();
        cache.put("A", 1);
        cache.put("B", 2);
        cache.put("C", 3);
        cache.get("B");
        cache.get("A");
        cache.get("C");

        // All counts equal: B was read first, so it goes
        cache.put("D", 4);

        assert!(!cache.contains_key("B"));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_new_entries_are_preferred_victims() {
        let mut cache = LfuCache::new(2).unwrap();
        cache.put("hot", 1);
        cache.get("hot");
        cache.put("cold", 2);

        cache.put("next", 3);

        assert!(cache.contains_key("hot"));
        assert!(!cache.contains_key("cold"));
    }

    #[test]
    fn test_overwrite_keeps_frequency() {
        let mut cache = LfuCache::new(2).unwrap();
        cache.put("A", 1);
        cache.get("A");
        cache.put("A", 10);

        assert_eq!(cache.access_count("A"), Some(1));
        assert_eq!(cache.get("A"), Some(10));
    }
}
