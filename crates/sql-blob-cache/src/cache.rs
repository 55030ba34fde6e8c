//! Cache facade over a storage adapter
//!
//! Adds the pieces the storage layer deliberately leaves out: key validation,
//! TTL normalization, typed values via serde_json, and lazy expiry checks on
//! read. The adapter only ever sees validated keys and serialized bytes.

use crate::adapter::CacheAdapter;
use crate::error::{CacheError, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Characters PSR-16 reserves; rejected so keys stay portable across cache
/// backends.
const RESERVED_KEY_CHARS: &[char] = &['{', '}', '(', ')', '/', '\\', '@', ':'];

const MAX_KEY_LENGTH: usize = 255;

type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Key/value cache backed by a SQL storage adapter.
pub struct DbCache<A: CacheAdapter> {
    adapter: A,
    default_ttl: u64,
    clock: Clock,
}

impl<A: CacheAdapter> DbCache<A> {
    /// `default_ttl` (seconds) applies whenever a write gives no TTL.
    pub fn new(adapter: A, default_ttl: u64) -> Self {
        Self::with_clock(adapter, default_ttl, Arc::new(|| Utc::now().timestamp()))
    }

    /// Same as [`new`](Self::new) with an injected clock, for deterministic
    /// expiry tests.
    pub fn with_clock(adapter: A, default_ttl: u64, clock: Clock) -> Self {
        Self {
            adapter,
            default_ttl,
            clock,
        }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    fn now(&self) -> i64 {
        (self.clock)()
    }

    fn expires_at(&self, ttl: Option<Duration>) -> i64 {
        let seconds = match ttl {
            Some(ttl) => ttl.as_secs().max(1),
            None => self.default_ttl,
        };
        self.now() + seconds as i64
    }

    /// Fetch and deserialize a value. Misses and lazily-expired entries both
    /// come back as `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        validate_key(key)?;

        match self.adapter.select(key).await? {
            Some(entry) if !entry.is_expired(self.now()) => {
                Ok(Some(serde_json::from_slice(&entry.data)?))
            }
            _ => Ok(None),
        }
    }

    /// [`get`](Self::get) with a caller-supplied default for misses.
    pub async fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        Ok(self.get(key).await?.unwrap_or(default))
    }

    /// Fetch several keys at once. Every requested key appears in the result;
    /// misses and expired entries map to `None`.
    pub async fn get_multiple<T: DeserializeOwned>(
        &self,
        keys: &[String],
    ) -> Result<BTreeMap<String, Option<T>>> {
        for key in keys {
            validate_key(key)?;
        }

        let now = self.now();
        let mut result: BTreeMap<String, Option<T>> =
            keys.iter().map(|k| (k.clone(), None)).collect();

        for entry in self.adapter.select_multiple(keys).await? {
            if !entry.is_expired(now) {
                result.insert(entry.key.clone(), Some(serde_json::from_slice(&entry.data)?));
            }
        }

        Ok(result)
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()> {
        validate_key(key)?;

        let mut values = BTreeMap::new();
        values.insert(key.to_string(), serde_json::to_vec(value)?);
        self.adapter.upsert(&values, self.expires_at(ttl)).await
    }

    /// Store several values with a shared TTL in one round trip.
    pub async fn set_multiple<T: Serialize>(
        &self,
        values: &BTreeMap<String, T>,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let mut serialized = BTreeMap::new();
        for (key, value) in values {
            validate_key(key)?;
            serialized.insert(key.clone(), serde_json::to_vec(value)?);
        }

        self.adapter.upsert(&serialized, self.expires_at(ttl)).await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.adapter.delete(key).await
    }

    pub async fn delete_multiple(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            validate_key(key)?;
        }
        self.adapter.delete_multiple(keys).await
    }

    pub async fn has(&self, key: &str) -> Result<bool> {
        validate_key(key)?;

        match self.adapter.select(key).await? {
            Some(entry) => Ok(!entry.is_expired(self.now())),
            None => Ok(false),
        }
    }

    /// Remove everything, expired or not.
    pub async fn clear(&self) -> Result<()> {
        self.adapter.truncate().await
    }

    /// Bulk-delete rows whose expiry has passed. Reads never depend on this
    /// running; it only reclaims space.
    pub async fn clean_expired(&self) -> Result<()> {
        self.adapter.delete_expired(self.now()).await
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty()
        || key.len() > MAX_KEY_LENGTH
        || key.chars().any(|c| RESERVED_KEY_CHARS.contains(&c))
    {
        return Err(CacheError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CacheEntry;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex;

    const BASE_TIME: i64 = 1_700_000_000;

    /// In-memory stand-in for a SQL backend, mirroring the adapter contract.
    #[derive(Default)]
    struct MemoryAdapter {
        rows: Mutex<BTreeMap<String, (Vec<u8>, i64)>>,
    }

    #[async_trait]
    impl CacheAdapter for MemoryAdapter {
        async fn select(&self, key: &str) -> Result<Option<CacheEntry>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .get(key)
                .map(|(data, expires)| CacheEntry::new(key, data.clone(), *expires)))
        }

        async fn select_multiple(&self, keys: &[String]) -> Result<Vec<CacheEntry>> {
            let rows = self.rows.lock().unwrap();
            Ok(keys
                .iter()
                .filter_map(|k| {
                    rows.get(k)
                        .map(|(data, expires)| CacheEntry::new(k.clone(), data.clone(), *expires))
                })
                .collect())
        }

        async fn upsert(&self, values: &BTreeMap<String, Vec<u8>>, expires: i64) -> Result<()> {
            let mut rows = self.rows.lock().unwrap();
            for (key, data) in values {
                rows.insert(key.clone(), (data.clone(), expires));
            }
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.rows.lock().unwrap().remove(key);
            Ok(())
        }

        async fn delete_multiple(&self, keys: &[String]) -> Result<()> {
            let mut rows = self.rows.lock().unwrap();
            for key in keys {
                rows.remove(key);
            }
            Ok(())
        }

        async fn truncate(&self) -> Result<()> {
            self.rows.lock().unwrap().clear();
            Ok(())
        }

        async fn delete_expired(&self, now: i64) -> Result<()> {
            self.rows.lock().unwrap().retain(|_, (_, expires)| now < *expires);
            Ok(())
        }
    }

    fn time_travel_cache() -> (DbCache<MemoryAdapter>, Arc<AtomicI64>) {
        let offset = Arc::new(AtomicI64::new(0));
        let clock_offset = offset.clone();
        let cache = DbCache::with_clock(
            MemoryAdapter::default(),
            86_400,
            Arc::new(move || BASE_TIME + clock_offset.load(Ordering::SeqCst)),
        );
        (cache, offset)
    }

    #[test]
    fn test_validate_key_accepts_plain_keys() {
        assert!(validate_key("user.profile.42").is_ok());
        assert!(validate_key("a-b_c").is_ok());
    }

    #[test]
    fn test_validate_key_rejects_empty_reserved_and_long() {
        assert!(validate_key("").is_err());
        assert!(validate_key("bad{key}").is_err());
        assert!(validate_key("a:b").is_err());
        assert!(validate_key("a/b").is_err());
        assert!(validate_key(&"x".repeat(256)).is_err());
        assert!(validate_key(&"x".repeat(255)).is_ok());
    }

    #[tokio::test]
    async fn test_set_get_round_trip() {
        let (cache, _) = time_travel_cache();
        cache.set("greeting", &"hello".to_string(), None).await.unwrap();
        let value: Option<String> = cache.get("greeting").await.unwrap();
        assert_eq!(value, Some("hello".to_string()));
    }

    #[tokio::test]
    async fn test_get_miss_is_none_not_error() {
        let (cache, _) = time_travel_cache();
        let value: Option<String> = cache.get("absent").await.unwrap();
        assert!(value.is_none());
        assert_eq!(cache.get_or("absent", 7i64).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_lazy_miss() {
        let (cache, offset) = time_travel_cache();
        cache
            .set("short", &1i64, Some(Duration::from_secs(5)))
            .await
            .unwrap();

        offset.store(4, Ordering::SeqCst);
        assert!(cache.has("short").await.unwrap());

        // expiry boundary: expired exactly when now reaches expires
        offset.store(5, Ordering::SeqCst);
        assert!(!cache.has("short").await.unwrap());
        assert_eq!(cache.get::<i64>("short").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clean_expired_respects_boundary() {
        let (cache, offset) = time_travel_cache();
        cache.set("a", &1i64, Some(Duration::from_secs(5))).await.unwrap();
        cache.set("b", &2i64, Some(Duration::from_secs(10))).await.unwrap();

        offset.store(5, Ordering::SeqCst);
        cache.clean_expired().await.unwrap();

        assert!(cache.adapter().select("a").await.unwrap().is_none());
        assert!(cache.adapter().select("b").await.unwrap().is_some());

        offset.store(10, Ordering::SeqCst);
        cache.clean_expired().await.unwrap();
        assert!(cache.adapter().select("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_multiple_reports_every_requested_key() {
        let (cache, _) = time_travel_cache();
        cache.set("a", &1i64, None).await.unwrap();
        cache.set("c", &3i64, None).await.unwrap();

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let values = cache.get_multiple::<i64>(&keys).await.unwrap();

        assert_eq!(values.len(), 3);
        assert_eq!(values["a"], Some(1));
        assert_eq!(values["b"], None);
        assert_eq!(values["c"], Some(3));
    }

    #[tokio::test]
    async fn test_set_multiple_and_clear() {
        let (cache, _) = time_travel_cache();
        let mut values = BTreeMap::new();
        values.insert("x".to_string(), 1i64);
        values.insert("y".to_string(), 2i64);
        cache.set_multiple(&values, None).await.unwrap();

        assert!(cache.has("x").await.unwrap());
        assert!(cache.has("y").await.unwrap());

        cache.clear().await.unwrap();
        assert!(!cache.has("x").await.unwrap());
        assert!(!cache.has("y").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent_through_facade() {
        let (cache, _) = time_travel_cache();
        cache.delete("never-existed").await.unwrap();
        cache.delete_multiple(&[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_key_rejected_before_adapter() {
        let (cache, _) = time_travel_cache();
        let err = cache.set("bad:key", &1i64, None).await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value_and_expiry() {
        let (cache, offset) = time_travel_cache();
        cache.set("k", &"v1".to_string(), Some(Duration::from_secs(5))).await.unwrap();
        cache.set("k", &"v2".to_string(), Some(Duration::from_secs(50))).await.unwrap();

        offset.store(10, Ordering::SeqCst);
        let value: Option<String> = cache.get("k").await.unwrap();
        assert_eq!(value, Some("v2".to_string()));
    }

    #[tokio::test]
    async fn test_zero_ttl_rounds_up_to_one_second() {
        let (cache, offset) = time_travel_cache();
        cache.set("k", &1i64, Some(Duration::ZERO)).await.unwrap();
        assert!(cache.has("k").await.unwrap());

        offset.store(1, Ordering::SeqCst);
        assert!(!cache.has("k").await.unwrap());
    }
}
