//! Key-value cache backends for the identity cache.
//!
//! Two implementations sit behind [`CacheClient`]: Redis through a
//! reconnecting [`ConnectionManager`], and an in-process map used by
//! single-node deployments and tests.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::CacheConfig;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Cache operation timed out after {0:?}")]
    Timeout(Duration),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        Self::Backend(err.to_string())
    }
}

#[async_trait]
pub trait CacheClient: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Round-trips to the backend without touching real keys.
    async fn ping(&self) -> Result<(), CacheError>;
}

/// Builds the backend named by `cache.url`.
pub async fn connect(config: &CacheConfig) -> Result<Arc<dyn CacheClient>, CacheError> {
    if config.url == "memory" {
        info!("Using in-process identity cache");
        return Ok(Arc::new(MemoryCache::new()));
    }

    let timeout = Duration::from_millis(config.response_timeout_ms);
    let cache = RedisCache::connect(&config.url, timeout).await?;
    info!("Connected to Redis identity cache");
    Ok(Arc::new(cache))
}

#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    timeout: Duration,
}

impl RedisCache {
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = tokio::time::timeout(timeout * 4, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Timeout(timeout * 4))??;

        Ok(Self { conn, timeout })
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, CacheError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| CacheError::Timeout(self.timeout))?
            .map_err(CacheError::from)
    }
}

#[async_trait]
impl CacheClient for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        self.bounded(async move { conn.get::<_, Option<String>>(key).await })
            .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let seconds = ttl.as_secs().max(1);
        self.bounded(async move { conn.set_ex::<_, _, ()>(key, value, seconds).await })
            .await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        self.bounded(async move { conn.del::<_, ()>(key).await })
            .await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        self.bounded(async move { conn.exists::<_, bool>("gatehouse:ping").await })
            .await
            .map(|_| ())
    }
}

/// In-process cache with per-entry expiry. Expired entries are dropped on read
/// and swept on every write.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, (String, Instant)>>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheClient for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some((value, deadline)) if *deadline > Instant::now() => {
                    return Ok(Some(value.clone()));
                }
                Some(_) => {}
            }
        }

        remove_if_expired(&mut *self.entries.write().await, key, Instant::now());
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, deadline)| *deadline > now);
        entries.insert(key.to_string(), (value.to_string(), now + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// A writer may have refreshed the key between the read and write lock, so the
/// deadline is checked again before removing.
fn remove_if_expired(entries: &mut HashMap<String, (String, Instant)>, key: &str, now: Instant) {
    if entries.get(key).is_some_and(|(_, deadline)| *deadline <= now) {
        entries.remove(key);
    }
}
