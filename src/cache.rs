//! Read-through cache for portfolio and holdings queries.
//!
//! Caching is never a correctness dependency: backend errors are logged and
//! treated as misses, and the service runs fine with no cache at all.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

pub fn portfolio_key(account_id: Uuid) -> String {
    format!("portfolio:{account_id}")
}

pub fn holdings_key(account_id: Uuid) -> String {
    format!("holdings:{account_id}")
}

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-process TTL cache. Expired entries are evicted when read.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Read and decode a cached JSON value. Any failure is a miss.
pub async fn get_json<T: DeserializeOwned>(cache: Option<&dyn Cache>, key: &str) -> Option<T> {
    let cache = cache?;
    match cache.get(key).await {
        Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(key, error = %err, "[cache] dropping undecodable entry");
                None
            }
        },
        Ok(None) => None,
        Err(err) => {
            tracing::warn!(key, error = %err, "[cache] get failed, treating as miss");
            None
        }
    }
}

/// Encode and store a JSON value. Failures are logged and ignored.
pub async fn set_json<T: Serialize>(cache: Option<&dyn Cache>, key: &str, value: &T, ttl: Duration) {
    let Some(cache) = cache else {
        return;
    };
    let bytes = match serde_json::to_vec(value) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(key, error = %err, "[cache] failed to encode value");
            return;
        }
    };
    if let Err(err) = cache.set(key, bytes, ttl).await {
        tracing::warn!(key, error = %err, "[cache] set failed");
    }
}

/// Drop the portfolio and holdings entries of an account.
pub async fn invalidate_account(cache: Option<&dyn Cache>, account_id: Uuid) {
    let Some(cache) = cache else {
        return;
    };
    for key in [portfolio_key(account_id), holdings_key(account_id)] {
        if let Err(err) = cache.delete(&key).await {
            tracing::warn!(key = %key, error = %err, "[cache] invalidation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = MemoryCache::new();
        cache.set("k", b"v".to_vec(), Duration::from_millis(20)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn invalidate_account_removes_both_keys() {
        let cache = MemoryCache::new();
        let account_id = Uuid::new_v4();
        let other = Uuid::new_v4();
        for key in [portfolio_key(account_id), holdings_key(account_id), portfolio_key(other)] {
            cache.set(&key, b"x".to_vec(), Duration::from_secs(30)).await.unwrap();
        }

        invalidate_account(Some(&cache), account_id).await;

        assert_eq!(cache.get(&portfolio_key(account_id)).await.unwrap(), None);
        assert_eq!(cache.get(&holdings_key(account_id)).await.unwrap(), None);
        assert!(cache.get(&portfolio_key(other)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn absent_cache_is_always_a_miss() {
        let value: Option<u32> = get_json(None, "anything").await;
        assert!(value.is_none());
        set_json(None, "anything", &5u32, Duration::from_secs(1)).await;
        invalidate_account(None, Uuid::new_v4()).await;
    }

    #[tokio::test]
    async fn undecodable_entry_is_a_miss() {
        let cache = MemoryCache::new();
        cache.set("k", b"not json".to_vec(), Duration::from_secs(5)).await.unwrap();
        let value: Option<Vec<u32>> = get_json(Some(&cache), "k").await;
        assert!(value.is_none());
    }
}
