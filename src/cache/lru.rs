//! LRU Cache Module
//!
//! Size-bounded cache that evicts the least recently used entry.

use std::collections::HashMap;

use tracing::debug;

use crate::cache::{AccessOrder, CacheEntry, CachePolicy};
use crate::error::{Result, VeloxError};

// == LRU Cache ==
/// Size-bounded cache with least-recently-used eviction.
#[derive(Debug)]
pub struct LruCache<T> {
    entries: HashMap<String, CacheEntry<T>>,
    order: AccessOrder,
    max_size: usize,
}

impl<T: Clone> LruCache<T> {
    /// Creates a cache holding at most `max_size` entries.
    ///
    /// Returns `InvalidConfig` when `max_size` is zero.
    pub fn new(max_size: usize) -> Result<Self> {
        if max_size == 0 {
            return Err(VeloxError::InvalidConfig(
                "LRU cache max_size must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            entries: HashMap::new(),
            order: AccessOrder::new(),
            max_size,
        })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Returns the entry for `key` without touching it.
    pub fn entry(&self, key: &str) -> Option<&CacheEntry<T>> {
        self.entries.get(key)
    }

    fn evict_lru(&mut self) {
        if let Some(victim) = self.order.oldest().map(str::to_string) {
            self.entries.remove(&victim);
            self.order.remove(&victim);
            debug!(key = %victim, "LRU eviction");
        }
    }
}

impl<T: Clone> CachePolicy<T> for LruCache<T> {
    fn get(&mut self, key: &str) -> Option<T> {
        let entry = self.entries.get_mut(key)?;
        entry.touch();
        self.order.touch(key);
        Some(entry.value.clone())
    }

    fn put(&mut self, key: &str, value: T) {
        if !self.entries.contains_key(key) && self.entries.len() >= self.max_size {
            self.evict_lru();
        }
        self.entries
            .insert(key.to_string(), CacheEntry::new(key, value, None));
        self.order.touch(key);
    }

    fn remove(&mut self, key: &str) -> Option<T> {
        self.order.remove(key);
        self.entries.remove(key).map(|e| e.value)
    }

    fn contains_key(&mut self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys from most to least recently used.
    fn keys(&mut self) -> Vec<String> {
        self.order.iter().map(str::to_string).collect()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
