//! The registry of `NotificationTypeConfig` records, backed by the
//! reserved `NOTIFICATION_CONFIG:*` key namespace on the shared cache.
//!
//! The store exclusively owns that namespace: it never writes counter
//! keys, and the quota engine never writes config keys.

use std::sync::Arc;

use async_trait::async_trait;
use notification_cache::{CacheError, RedisCache};
use notification_model::NotificationTypeConfig;
use thiserror::Error;

const SCAN_BATCH_HINT: usize = 50;

#[derive(Debug, Error)]
pub enum ConfigStoreError {
    #[error("no config registered for category {0:?}")]
    NotFound(String),
    #[error("config store unavailable: {0}")]
    Unavailable(#[from] CacheError),
    #[error("config for {name:?} is corrupt: {source}")]
    Corrupt {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The narrow cache capability the config store needs: read, write, and
/// scan the config namespace. Kept separate from the quota engine's
/// counter-oriented capability so each component's test doubles only
/// need to implement what that component actually calls.
#[async_trait]
pub trait ConfigCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;
    async fn scan_keys(&self, pattern: &str, batch_hint: usize) -> Result<Vec<String>, CacheError>;
}

#[async_trait]
impl ConfigCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        RedisCache::get(self, key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        RedisCache::set(self, key, value).await
    }

    async fn scan_keys(&self, pattern: &str, batch_hint: usize) -> Result<Vec<String>, CacheError> {
        RedisCache::scan_keys(self, pattern, batch_hint).await
    }
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn list(&self) -> Result<Vec<NotificationTypeConfig>, ConfigStoreError>;
    async fn get_by_name(&self, name: &str) -> Result<NotificationTypeConfig, ConfigStoreError>;
    async fn upsert(&self, config: NotificationTypeConfig) -> Result<(), ConfigStoreError>;
}

/// A `ConfigStore` backed by an `Arc`-shared cache capability.
pub struct CacheConfigStore {
    cache: Arc<dyn ConfigCache>,
}

impl CacheConfigStore {
    pub fn new(cache: Arc<dyn ConfigCache>) -> Self {
        Self { cache }
    }

    async fn get_by_key(&self, key: &str) -> Result<NotificationTypeConfig, ConfigStoreError> {
        let raw = self
            .cache
            .get(key)
            .await?
            .ok_or_else(|| ConfigStoreError::NotFound(key.to_string()))?;

        NotificationTypeConfig::from_json(&raw).map_err(|source| ConfigStoreError::Corrupt {
            name: key.to_string(),
            source,
        })
    }
}

#[async_trait]
impl ConfigStore for CacheConfigStore {
    /// Cursor-scans `NOTIFICATION_CONFIG:*` in batches, then fetches and
    /// decodes each matched key individually. A single corrupt entry
    /// fails the whole listing, per the scan-then-fetch contract: callers
    /// would rather see a loud, full-list failure than silently drop a
    /// misencoded category.
    async fn list(&self) -> Result<Vec<NotificationTypeConfig>, ConfigStoreError> {
        let pattern = format!("{}:*", notification_model::CONFIG_KEY_PREFIX);
        let keys = self.cache.scan_keys(&pattern, SCAN_BATCH_HINT).await?;

        let mut configs = Vec::with_capacity(keys.len());
        for key in keys {
            configs.push(self.get_by_key(&key).await?);
        }
        Ok(configs)
    }

    async fn get_by_name(&self, name: &str) -> Result<NotificationTypeConfig, ConfigStoreError> {
        tracing::debug!(category = name, "looking up notification type config");
        self.get_by_key(&NotificationTypeConfig::cache_key(name))
            .await
    }

    async fn upsert(&self, config: NotificationTypeConfig) -> Result<(), ConfigStoreError> {
        tracing::debug!(category = %config.name, "persisting notification type config");
        let json = config.to_json()?;
        self.cache
            .set(&NotificationTypeConfig::cache_key(&config.name), &json)
            .await?;
        Ok(())
    }
}
