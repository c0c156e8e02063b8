//! Cache Policy Trait
//!
//! Common single-key surface shared by the LRU, LFU and TTL caches.

/// Operations every eviction strategy exposes.
///
/// Lookups take `&mut self` because reads update recency, frequency or
/// purge expired entries.
pub trait CachePolicy<T: Clone> {
    /// Returns the value for `key`, recording the access.
    fn get(&mut self, key: &str) -> Option<T>;

    /// Stores `value`, evicting according to the policy when full.
    fn put(&mut self, key: &str, value: T);

    /// Removes `key`, returning its value if present.
    fn remove(&mut self, key: &str) -> Option<T>;

    fn contains_key(&mut self, key: &str) -> bool;

    fn keys(&mut self) -> Vec<String>;

    fn clear(&mut self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the cached value or stores the result of `compute`.
    ///
    /// `compute` runs at most once and only when no live value exists.
    fn get_or_put<F>(&mut self, key: &str, compute: F) -> T
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
}
