//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL, tag and
//! access-tracking metadata.

use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    /// Key this entry is stored under
    pub key: String,
    /// The stored value
    pub value: T,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
    /// Timestamp of the last successful read (Unix milliseconds)
    pub last_accessed_at: u64,
    /// Tags used for group invalidation
    pub tags: HashSet<String>,
    /// Number of successful reads
    pub access_count: u64,
}

impl<T> CacheEntry<T> {
    // == Constructor ==
    /// Creates a new cache entry with optional TTL and no tags.
    pub fn new(key: impl Into<String>, value: T, ttl: Option<Duration>) -> Self {
        Self::with_tags(key, value, ttl, HashSet::new())
    }

    /// Creates a new cache entry carrying the given tags.
    pub fn with_tags(
        key: impl Into<String>,
        value: T,
        ttl: Option<Duration>,
        tags: HashSet<String>,
    ) -> Self {
        let now = current_timestamp_ms();
        Self {
            key: key.into(),
            value,
            created_at: now,
            expires_at: ttl.map(|ttl| now.saturating_add(duration_ms(ttl))),
            last_accessed_at: now,
            tags,
            access_count: 0,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time is greater than or equal to
    /// its expiration time, so a zero TTL expires immediately.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    /// Expiry check against a caller-supplied clock reading.
    pub fn is_expired_at(&self, now: u64) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    // == Time To Live ==
    /// Returns remaining TTL, or None if no expiration is set.
    ///
    /// Returns `Some(Duration::ZERO)` once expired.
    pub fn ttl_remaining(&self) -> Option<Duration> {
        self.expires_at.map(|expires| {
            Duration::from_millis(expires.saturating_sub(current_timestamp_ms()))
        })
    }

    // == Touch ==
    /// Records a successful read.
    pub fn touch(&mut self) {
        // max() keeps last_accessed_at >= created_at if the wall clock steps back
        self.last_accessed_at = current_timestamp_ms().max(self.created_at);
        self.access_count += 1;
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Converts a duration to whole milliseconds, saturating at `u64::MAX`.
pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_entry_creation_no_ttl() {
        let entry = CacheEntry::new("k", "test_value".to_string(), None);

        assert_eq!(entry.key, "k");
        assert_eq!(entry.value, "test_value");
        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired());
        assert_eq!(entry.access_count, 0);
        assert_eq!(entry.last_accessed_at, entry.created_at);
    }

    #[test]
    fn test_entry_expiration() {
        let entry = CacheEntry::new("k", 1u32, Some(Duration::from_millis(30)));
        assert!(!entry.is_expired());

        sleep(Duration::from_millis(50));

        assert!(entry.is_expired());
        assert_eq!(entry.ttl_remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn test_zero_ttl_is_immediately_expired() {
        let entry = CacheEntry::new("k", 1u32, Some(Duration::ZERO));
        assert!(entry.is_expired());
    }

    #[test]
    fn test_ttl_remaining() {
        let entry = CacheEntry::new("k", 1u32, Some(Duration::from_secs(10)));

        let remaining = entry.ttl_remaining().unwrap();
        assert!(remaining <= Duration::from_secs(10));
        assert!(remaining >= Duration::from_secs(9));
        assert!(CacheEntry::new("k", 1u32, None).ttl_remaining().is_none());
    }

    #[test]
    fn test_touch_updates_access_metadata() {
        let mut entry = CacheEntry::new("k", 1u32, None);
        sleep(Duration::from_millis(5));
        entry.touch();
        entry.touch();

        assert_eq!(entry.access_count, 2);
        assert!(entry.last_accessed_at >= entry.created_at);
    }

    #[test]
    fn test_tags() {
        let tags = ["user".to_string(), "profile".to_string()].into_iter().collect();
        let entry = CacheEntry::with_tags("k", 1u32, None, tags);

        assert!(entry.has_tag("user"));
        assert!(entry.has_tag("profile"));
        assert!(!entry.has_tag("admin"));
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let now = current_timestamp_ms();
        let mut entry = CacheEntry::new("k", 1u32, None);
        entry.expires_at = Some(now);

        assert!(entry.is_expired_at(now), "Entry should be expired at boundary");
        assert!(!entry.is_expired_at(now - 1));
    }
}
