//! Valkey/Redis cache store implementation

use super::{CacheStore, StoreError};
use crate::config::StoreConfig;
use crate::entry::CacheEntry;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

/// Valkey/Redis cache store
///
/// The production backend: entries live in a Valkey (or Redis) server shared
/// by every proxy instance, one hash per cache key.
///
/// # Features
///
/// - Connection pooling and automatic reconnection via `ConnectionManager`
/// - Command retry with a configurable delay
/// - TCP (`redis://host:port`) and unix-socket (`unix:///path`) URLs
///
/// # Example
///
/// ```no_run
/// use ocsp_proxy::config::StoreConfig;
/// use ocsp_proxy::store::ValkeyStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = StoreConfig::new("redis://localhost:6379").with_key_prefix("ocspxy_");
/// let store = ValkeyStore::connect(&config).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ValkeyStore {
    conn: ConnectionManager,
    config: StoreConfig,
}

impl std::fmt::Debug for ValkeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValkeyStore")
            .field("config", &self.config)
            .finish()
    }
}

impl ValkeyStore {
    /// Connect to the store
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if the URL is invalid or the server
    /// cannot be reached.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| StoreError::Unavailable(format!("invalid store URL: {}", e)))?;

        // The connection manager handles reconnection transparently.
        let conn = ConnectionManager::new(client).await.map_err(|e| {
            StoreError::Unavailable(format!("cannot connect to {}: {}", config.url, e))
        })?;

        Ok(Self {
            conn,
            config: config.clone(),
        })
    }

    /// Execute a command with retry logic
    async fn with_retry<F, T>(&self, mut f: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Pin<Box<dyn Future<Output = Result<T, RedisError>> + Send>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match f().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    last_error = Some(e);

                    // Don't sleep after the last attempt
                    if attempt < self.config.max_retries {
                        tokio::time::sleep(self.config.retry_delay()).await;
                    }
                }
            }
        }

        Err(last_error.expect("at least one attempt ran").into())
    }
}

#[async_trait]
impl CacheStore for ValkeyStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        let owned_key = key.to_string();
        let conn = self.conn.clone();

        let fields: HashMap<String, Vec<u8>> = self
            .with_retry(|| {
                let key = owned_key.clone();
                let mut conn = conn.clone();
                Box::pin(async move { conn.hgetall(&key).await })
            })
            .await?;

        // HGETALL on a missing key yields an empty hash
        if fields.is_empty() {
            return Ok(None);
        }

        let entry = CacheEntry::from_fields(key, fields).map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(entry))
    }

    async fn put(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        let key = entry.cache_key.clone();
        let fields = entry.to_fields();
        let conn = self.conn.clone();

        self.with_retry(|| {
            let key = key.clone();
            let fields = fields.clone();
            let mut conn = conn.clone();
            Box::pin(async move { conn.hset_multiple(&key, &fields).await })
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let owned_key = key.to_string();
        let conn = self.conn.clone();

        self.with_retry(|| {
            let key = owned_key.clone();
            let mut conn = conn.clone();
            Box::pin(async move { conn.del(&key).await })
        })
        .await
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let pattern = format!("{}*", prefix);
        let conn = self.conn.clone();

        self.with_retry(|| {
            let pattern = pattern.clone();
            let mut conn = conn.clone();
            Box::pin(async move { conn.keys(&pattern).await })
        })
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let conn = self.conn.clone();

        self.with_retry(|| {
            let mut conn = conn.clone();
            Box::pin(async move {
                let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
                Ok(())
            })
        })
        .await
    }
}
