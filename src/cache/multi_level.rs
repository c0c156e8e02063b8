//! Multi-Level Cache Module
//!
//! Memory tier (L1) in front of a persistent key-value store (L2).
//! L2 hits are promoted into L1.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::entry::{current_timestamp_ms, duration_ms};
use crate::cache::{CacheStats, Codec, Envelope, VeloxCache};
use crate::config::CacheConfig;
use crate::error::Result;
use crate::storage::KeyValueStore;

// == Multi Level Cache ==
/// Two-tier cache cascade.
///
/// Writes go to both tiers without atomicity: a failed L2 write leaves
/// the L1 write in place. Stats are tracked per tier.
pub struct MultiLevelCache<T> {
    l1: VeloxCache<T>,
    l2: Arc<dyn KeyValueStore>,
    prefix: String,
    l2_ttl: Duration,
    l2_stats: Mutex<CacheStats>,
    codec: Codec<T>,
}

impl<T: Clone + Send + 'static> MultiLevelCache<T> {
    // == Constructor ==
    /// Builds the cascade from `config`, using `store` as L2.
    pub fn new(config: &CacheConfig, store: Arc<dyn KeyValueStore>, codec: Codec<T>) -> Result<Self> {
        Ok(Self {
            l1: VeloxCache::from_config(config)?,
            l2: store,
            prefix: config.l2_prefix.clone(),
            l2_ttl: config.l2_ttl,
            l2_stats: Mutex::new(CacheStats::new()),
            codec,
        })
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn l2_stats_mut(&self) -> MutexGuard<'_, CacheStats> {
        self.l2_stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_l2_miss(&self, expired: bool) {
        let mut stats = self.l2_stats_mut();
        stats.record_miss();
        if expired {
            stats.record_expiration();
        }
    }

    // == Get ==
    /// Reads through L1 then L2, promoting L2 hits into L1.
    ///
    /// Undecodable L2 data is a miss. Store I/O errors are returned.
    pub async fn get(&self, key: &str) -> Result<Option<T>> {
        if let Some(value) = self.l1.get(key) {
            return Ok(Some(value));
        }

        let storage_key = self.storage_key(key);
        let Some(raw) = self.l2.read(&storage_key).await? else {
            self.record_l2_miss(false);
            return Ok(None);
        };

        let envelope = match Envelope::decode(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(key = %key, error = %err, "Discarding undecodable L2 envelope");
                self.record_l2_miss(false);
                return Ok(None);
            }
        };

        if envelope.is_expired() {
            self.l2.remove(&storage_key).await?;
            self.record_l2_miss(true);
            return Ok(None);
        }

        let value = match (self.codec.deserialize)(&envelope.value) {
            Ok(value) => value,
            Err(err) => {
                warn!(key = %key, error = %err, "Discarding undecodable L2 value");
                self.record_l2_miss(false);
                return Ok(None);
            }
        };

        self.l2_stats_mut().record_hit();
        // Promotion uses the L1 TTL, not the remaining L2 lifetime
        self.l1.put(key, value.clone());
        debug!(key = %key, "Promoted L2 hit into L1");
        Ok(Some(value))
    }

    // == Put ==
    /// Writes `value` to L1 and an envelope to L2.
    pub async fn put(&self, key: &str, value: T) -> Result<()> {
        self.l1.put(key, value.clone());

        let serialized = (self.codec.serialize)(&value)?;
        let expires_at = current_timestamp_ms().saturating_add(duration_ms(self.l2_ttl));
        let raw = Envelope::new(serialized, Some(expires_at)).encode()?;
        self.l2.write(&self.storage_key(key), raw).await?;
        self.l2_stats_mut().record_write();
        Ok(())
    }

    /// Removes `key` from both tiers.
    pub async fn remove(&self, key: &str) -> Result<()> {
        self.l1.remove(key);
        self.l2.remove(&self.storage_key(key)).await?;
        Ok(())
    }

    /// Returns true if either tier holds `key`.
    pub async fn contains_key(&self, key: &str) -> Result<bool> {
        if self.l1.contains_key(key) {
            return Ok(true);
        }
        Ok(self.l2.contains_key(&self.storage_key(key)).await?)
    }

    // == Clear ==
    /// Empties L1 and deletes this cache's namespaced keys from L2.
    ///
    /// Other data sharing the store is left alone.
    pub async fn clear(&self) -> Result<()> {
        self.l1.clear();
        let owned: Vec<String> = self
            .l2
            .keys()
            .await?
            .into_iter()
            .filter(|k| k.starts_with(&self.prefix))
            .collect();
        for key in &owned {
            self.l2.remove(key).await?;
        }
        debug!(removed = owned.len(), "Cleared namespaced L2 keys");
        Ok(())
    }

    /// Empties only the memory tier.
    pub fn clear_l1(&self) {
        self.l1.clear();
    }

    pub fn l1(&self) -> &VeloxCache<T> {
        &self.l1
    }

    pub fn l1_stats(&self) -> CacheStats {
        self.l1.stats()
    }

    pub fn l2_stats(&self) -> CacheStats {
        self.l2_stats_mut().clone()
    }
}

impl<T> MultiLevelCache<T>
where
    T: Clone + Send + Serialize + DeserializeOwned + 'static,
{
    /// Builds the cascade with JSON value encoding.
    pub fn json(config: &CacheConfig, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        Self::new(config, store, Codec::json())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn config() -> CacheConfig {
        CacheConfig {
            max_size: 10,
            default_ttl: Duration::from_secs(60),
            l2_ttl: Duration::from_secs(600),
            l2_prefix: "mlc_".to_string(),
            ..CacheConfig::default()
        }
    }

    fn cache_with_store() -> (MultiLevelCache<Vec<String>>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let cache = MultiLevelCache::json(&config(), store.clone()).unwrap();
        (cache, store)
    }

    #[tokio::test]
    async fn test_put_writes_both_tiers() {
        let (cache, store) = cache_with_store();
        cache.put("k", vec!["a".to_string()]).await.unwrap();

        assert!(cache.l1().contains_key("k"));
        let raw = store.read("mlc_k").await.unwrap().unwrap();
        let envelope = Envelope::decode(&raw).unwrap();
        assert_eq!(envelope.value, r#"["a"]"#);
        assert!(envelope.expires_at.unwrap() > current_timestamp_ms());
    }

    #[tokio::test]
    async fn test_l2_hit_is_promoted() {
        let (cache, _store) = cache_with_store();
        cache.put("k", vec!["v".to_string()]).await.unwrap();
        cache.clear_l1();

        let before = cache.l1_stats();
        assert_eq!(cache.get("k").await.unwrap(), Some(vec!["v".to_string()]));
        let after_first = cache.l1_stats();
        assert_eq!(after_first.misses - before.misses, 1);
        assert_eq!(cache.l2_stats().hits, 1);

        assert_eq!(cache.get("k").await.unwrap(), Some(vec!["v".to_string()]));
        let after_second = cache.l1_stats();
        assert_eq!(after_second.hits - after_first.hits, 1);
        assert_eq!(cache.l2_stats().hits, 1);
    }

    #[tokio::test]
    async fn test_miss_in_both_tiers() {
        let (cache, _store) = cache_with_store();
        assert_eq!(cache.get("absent").await.unwrap(), None);
        assert_eq!(cache.l1_stats().misses, 1);
        assert_eq!(cache.l2_stats().misses, 1);
    }

    #[tokio::test]
    async fn test_expired_l2_entry_is_deleted() {
        let (cache, store) = cache_with_store();
        let past = current_timestamp_ms() - 10;
        let raw = Envelope::new("[]".to_string(), Some(past)).encode().unwrap();
        store.write("mlc_old", raw).await.unwrap();

        assert_eq!(cache.get("old").await.unwrap(), None);
        assert!(!store.contains_key("mlc_old").await.unwrap());
        let l2 = cache.l2_stats();
        assert_eq!(l2.misses, 1);
        assert_eq!(l2.expirations, 1);
    }

    #[tokio::test]
    async fn test_corrupt_l2_data_is_soft_miss() {
        let (cache, store) = cache_with_store();
        store.write("mlc_bad", "{not json".to_string()).await.unwrap();
        store
            .write("mlc_wrong", r#"{"value":"42"}"#.to_string())
            .await
            .unwrap();

        assert_eq!(cache.get("bad").await.unwrap(), None);
        assert_eq!(cache.get("wrong").await.unwrap(), None);
        assert_eq!(cache.l2_stats().misses, 2);
    }

    #[tokio::test]
    async fn test_clear_only_touches_namespace() {
        let (cache, store) = cache_with_store();
        store.write("foreign", "keep".to_string()).await.unwrap();
        cache.put("a", vec![]).await.unwrap();
        cache.put("b", vec![]).await.unwrap();

        cache.clear().await.unwrap();

        assert_eq!(store.keys().await.unwrap(), vec!["foreign".to_string()]);
        assert!(cache.l1().is_empty());
    }

    #[tokio::test]
    async fn test_l2_write_failure_keeps_l1() {
        let (cache, store) = cache_with_store();
        store.set_fail_writes(true);

        let result = cache.put("k", vec!["v".to_string()]).await;

        assert!(result.is_err());
        assert!(cache.l1().contains_key("k"));
    }

    #[tokio::test]
    async fn test_remove_and_contains() {
        let (cache, _store) = cache_with_store();
        cache.put("k", vec![]).await.unwrap();
        cache.clear_l1();

        assert!(cache.contains_key("k").await.unwrap());
        cache.remove("k").await.unwrap();
        assert!(!cache.contains_key("k").await.unwrap());
    }
}
