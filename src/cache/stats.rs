//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, writes,
//! evictions and expirations.

use serde::Serialize;

// == Cache Stats ==
/// Tracks cache performance metrics.
///
/// Each cache instance owns its own value; there is no process-wide counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Lookups that returned a live (or tolerated stale) value
    pub hits: u64,
    /// Lookups that found nothing usable
    pub misses: u64,
    /// Number of values written
    pub writes: u64,
    /// Number of entries evicted due to capacity
    pub evictions: u64,
    /// Number of entries dropped because their TTL elapsed
    pub expirations: u64,
    /// Entry count at the time of the snapshot
    pub total_entries: usize,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_lookups();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn total_lookups(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_write(&mut self) {
        self.writes += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_expiration(&mut self) {
        self.expirations += 1;
    }

    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }

    // == Reset ==
    /// Zeroes every counter, keeping the entry count.
    pub fn reset(&mut self) {
        *self = Self {
            total_entries: self.total_entries,
            ..Self::default()
        };
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn with_counts(hits: u64, misses: u64) -> CacheStats {
        CacheStats {
            hits,
            misses,
            ..CacheStats::new()
        }
    }

    #[test]
    fn test_new_is_zeroed() {
        let stats = CacheStats::new();
        assert_eq!(stats.total_lookups(), 0);
        assert_eq!(stats.hit_rate(), 0.0);
        assert_eq!(stats, CacheStats::default());
    }

    #[test]
    fn test_hit_rate_ratios() {
        assert_eq!(with_counts(3, 1).hit_rate(), 0.75);
        assert_eq!(with_counts(0, 5).hit_rate(), 0.0);
        assert_eq!(with_counts(2, 0).hit_rate(), 1.0);
        assert_eq!(with_counts(3, 1).total_lookups(), 4);
    }

    #[test]
    fn test_record_helpers_bump_one_counter_each() {
        let mut stats = CacheStats::new();
        stats.record_write();
        stats.record_write();
        stats.record_eviction();
        stats.record_expiration();

        assert_eq!((stats.writes, stats.evictions, stats.expirations), (2, 1, 1));
        assert_eq!(stats.total_lookups(), 0);
    }

    #[test]
    fn test_reset_keeps_entry_count() {
        let mut stats = with_counts(4, 4);
        stats.record_eviction();
        stats.set_total_entries(7);

        stats.reset();

        assert_eq!(
            stats,
            CacheStats {
                total_entries: 7,
                ..CacheStats::new()
            }
        );
    }

    #[test]
    fn test_serializes_counters() {
        let json = serde_json::to_value(with_counts(1, 2)).unwrap();
        assert_eq!(json["hits"], 1);
        assert_eq!(json["misses"], 2);
        assert_eq!(json["expirations"], 0);
    }
}
