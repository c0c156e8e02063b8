//! Write-Through Cache Module
//!
//! Single memory tier mirrored to a persistent store on every write.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::entry::{current_timestamp_ms, duration_ms};
use crate::cache::{CacheStats, Codec, Envelope, VeloxCache};
use crate::config::CacheConfig;
use crate::error::Result;
use crate::storage::KeyValueStore;

// == Write Through Cache ==
/// Memory cache whose writes are mirrored to `store` under the same key.
///
/// `put` writes memory first, then storage. A storage failure is returned
/// to the caller but the memory write is kept.
pub struct WriteThroughCache<T> {
    memory: VeloxCache<T>,
    store: Arc<dyn KeyValueStore>,
    default_ttl: Duration,
    codec: Codec<T>,
}

impl<T: Clone + Send + 'static> WriteThroughCache<T> {
    pub fn new(config: &CacheConfig, store: Arc<dyn KeyValueStore>, codec: Codec<T>) -> Result<Self> {
        Ok(Self {
            memory: VeloxCache::from_config(config)?,
            store,
            default_ttl: config.default_ttl,
            codec,
        })
    }

    // == Put ==
    /// Writes `value` to memory and then to storage.
    pub async fn put(&self, key: &str, value: T, ttl: Option<Duration>) -> Result<()> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        self.memory.put_with(key, value.clone(), Some(ttl), &[]);

        let serialized = (self.codec.serialize)(&value)?;
        let expires_at = current_timestamp_ms().saturating_add(duration_ms(ttl));
        let raw = Envelope::new(serialized, Some(expires_at)).encode()?;
        self.store.write(key, raw).await?;
        Ok(())
    }

    // == Get ==
    /// Reads memory, falling back to storage and repopulating memory.
    ///
    /// The repopulated entry lives for whatever TTL the stored envelope has
    /// left (possibly none), or the default TTL when it carries no expiry.
    /// Undecodable stored data is treated as a miss.
    pub async fn get(&self, key: &str) -> Result<Option<T>> {
        if let Some(value) = self.memory.get(key) {
            return Ok(Some(value));
        }

        let Some(raw) = self.store.read(key).await? else {
            return Ok(None);
        };

        let decoded = Envelope::decode(&raw)
            .map_err(Into::into)
            .and_then(|envelope| (self.codec.deserialize)(&envelope.value).map(|v| (envelope, v)));
        let (envelope, value) = match decoded {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(key = %key, error = %err, "Ignoring undecodable stored value");
                return Ok(None);
            }
        };

        let ttl = envelope
            .remaining_ms()
            .map(|ms| Duration::from_millis(ms.max(0) as u64))
            .unwrap_or(self.default_ttl);
        self.memory.put_with(key, value.clone(), Some(ttl), &[]);
        debug!(key = %key, ttl_ms = duration_ms(ttl), "Repopulated memory from storage");
        Ok(Some(value))
    }

    /// Removes `key` from memory and storage.
    pub async fn remove(&self, key: &str) -> Result<()> {
        self.memory.remove(key);
        self.store.remove(key).await?;
        Ok(())
    }

    /// Empties memory and the backing store.
    pub async fn clear(&self) -> Result<()> {
        self.memory.clear();
        self.store.clear().await?;
        Ok(())
    }

    pub fn memory(&self) -> &VeloxCache<T> {
        &self.memory
    }

    pub fn stats(&self) -> CacheStats {
        self.memory.stats()
    }
}

impl<T> WriteThroughCache<T>
where
    T: Clone + Send + Serialize + DeserializeOwned + 'static,
{
    /// Builds the cache with JSON value encoding.
    pub fn json(config: &CacheConfig, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        Self::new(config, store, Codec::json())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn cache_with_store() -> (WriteThroughCache<u64>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let config = CacheConfig {
            max_size: 8,
            default_ttl: Duration::from_secs(60),
            ..CacheConfig::default()
        };
        (WriteThroughCache::json(&config, store.clone()).unwrap(), store)
    }

    #[tokio::test]
    async fn test_put_mirrors_to_storage_with_same_key() {
        let (cache, store) = cache_with_store();
        cache.put("answer", 42, None).await.unwrap();

        let raw = store.read("answer").await.unwrap().unwrap();
        assert_eq!(Envelope::decode(&raw).unwrap().value, "42");
        assert_eq!(cache.get("answer").await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn test_memory_miss_repopulates_with_remaining_ttl() {
        let (cache, _store) = cache_with_store();
        cache.put("k", 7, Some(Duration::from_secs(30))).await.unwrap();
        cache.memory().clear();

        assert_eq!(cache.get("k").await.unwrap(), Some(7));

        let remaining = cache.memory().entry("k").unwrap().ttl_remaining().unwrap();
        assert!(remaining <= Duration::from_secs(30));
        assert!(remaining > Duration::from_secs(25));
    }

    #[tokio::test]
    async fn test_stored_value_without_expiry_uses_default_ttl() {
        let (cache, store) = cache_with_store();
        store.write("k", r#"{"value":"5"}"#.to_string()).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap(), Some(5));
        let remaining = cache.memory().entry("k").unwrap().ttl_remaining().unwrap();
        assert!(remaining > Duration::from_secs(55));
    }

    #[tokio::test]
    async fn test_past_expiry_repopulates_already_expired() {
        let (cache, store) = cache_with_store();
        let past = current_timestamp_ms() - 5_000;
        let raw = Envelope::new("9".to_string(), Some(past)).encode().unwrap();
        store.write("k", raw).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap(), Some(9));
        assert!(cache.memory().entry("k").unwrap().is_expired());
    }

    #[tokio::test]
    async fn test_deserialization_failure_is_soft_miss() {
        let (cache, store) = cache_with_store();
        store.write("bad", "garbage".to_string()).await.unwrap();
        store
            .write("typed", r#"{"value":"\"text\""}"#.to_string())
            .await
            .unwrap();

        assert_eq!(cache.get("bad").await.unwrap(), None);
        assert_eq!(cache.get("typed").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_storage_failure_keeps_memory_write() {
        let (cache, store) = cache_with_store();
        store.set_fail_writes(true);

        assert!(cache.put("k", 1, None).await.is_err());
        assert_eq!(cache.memory().peek("k"), Some(1));
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let (cache, store) = cache_with_store();
        cache.put("a", 1, None).await.unwrap();
        cache.put("b", 2, None).await.unwrap();

        cache.remove("a").await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), None);

        cache.clear().await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());
        assert_eq!(cache.get("b").await.unwrap(), None);
    }
}
