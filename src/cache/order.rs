//! Access Order Module
//!
//! Recency ordering shared by the bounded cache policies.

use std::collections::VecDeque;

// == Access Order ==
/// Keeps keys ordered by last access.
///
/// Keys are stored in a VecDeque where:
/// - Front = Most recently used
/// - Back = Least recently used
///
/// Lookups are linear scans, which is acceptable for the bounded sizes the
/// caches in this crate are configured with.
#[derive(Debug, Default, Clone)]
pub struct AccessOrder {
    order: VecDeque<String>,
}

impl AccessOrder {
    pub fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Marks a key as most recently used, inserting it if unknown.
    pub fn touch(&mut self, key: &str) {
        self.remove(key);
        self.order.push_front(key.to_string());
    }

    pub fn remove(&mut self, key: &str) {
        self.order.retain(|k| k != key);
    }

    /// Returns the least recently used key without removing it.
    pub fn oldest(&self) -> Option<&str> {
        self.order.back().map(String::as_str)
    }

    /// Returns the least recently used key matching `pred`.
    pub fn oldest_where(&self, mut pred: impl FnMut(&str) -> bool) -> Option<&str> {
        self.order.iter().rev().map(String::as_str).find(|k| pred(k))
    }

    /// Iterates keys from most to least recently used.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_orders_by_recency() {
        let mut order = AccessOrder::new();
        order.touch("a");
        order.touch("b");
        order.touch("c");

        assert_eq!(order.oldest(), Some("a"));

        order.touch("a");
        assert_eq!(order.oldest(), Some("b"));
        assert_eq!(order.iter().collect::<Vec<_>>(), vec!["a", "c", "b"]);
    }

    #[test]
    fn test_touch_same_key_keeps_single_slot() {
        let mut order = AccessOrder::new();
        order.touch("k");
        order.touch("k");
        order.touch("k");
        assert_eq!(order.len(), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut order = AccessOrder::new();
        order.touch("a");
        order.touch("b");
        order.remove("a");
        order.remove("missing");

        assert_eq!(order.oldest(), Some("b"));

        order.clear();
        assert!(order.is_empty());
        assert_eq!(order.oldest(), None);
    }

    #[test]
    fn test_oldest_where_skips_non_matching() {
        let mut order = AccessOrder::new();
        order.touch("a1");
        order.touch("b1");
        order.touch("a2");

        assert_eq!(order.oldest_where(|k| k.starts_with('b')), Some("b1"));
        assert_eq!(order.oldest_where(|k| k.starts_with('z')), None);
    }
}
