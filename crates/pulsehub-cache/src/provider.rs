//! Store manager that dispatches to the configured provider.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tracing::info;

use pulsehub_core::config::cache::CacheConfig;
use pulsehub_core::error::AppError;
use pulsehub_core::result::AppResult;
use pulsehub_core::traits::cache::CacheProvider;
use pulsehub_core::traits::pubsub::PubSubProvider;

/// Wraps the configured store and broadcast providers.
///
/// Both are selected together at construction time so the bridge always
/// broadcasts over the same backend that holds presence and pending state.
#[derive(Debug, Clone)]
pub struct CacheManager {
    /// The inner store provider.
    inner: Arc<dyn CacheProvider>,
    /// The inner broadcast provider.
    pubsub: Arc<dyn PubSubProvider>,
}

impl CacheManager {
    /// Create a new manager from configuration.
    pub async fn new(config: &CacheConfig) -> AppResult<Self> {
        match config.provider.as_str() {
            #[cfg(feature = "redis-backend")]
            "redis" => {
                info!("Initializing Redis store provider");
                let client = crate::redis::RedisClient::connect(&config.redis).await?;
                let pubsub = crate::redis::RedisPubSub::new(client.clone());
                let provider =
                    crate::redis::RedisCacheProvider::new(client);
                Ok(Self::from_providers(Arc::new(provider), Arc::new(pubsub)))
            }
            #[cfg(feature = "memory")]
            "memory" => {
                info!("Initializing in-memory store provider");
                Ok(Self::in_memory(config))
            }
            other => Err(AppError::configuration(format!(
                "Unknown cache provider: '{other}'. Supported: memory, redis"
            ))),
        }
    }

    /// Build an in-memory manager (single instance, and tests).
    #[cfg(feature = "memory")]
    pub fn in_memory(config: &CacheConfig) -> Self {
        let provider = crate::memory::MemoryCacheProvider::new(&config.memory);
        let pubsub = crate::memory::MemoryPubSub::new(config.memory.broadcast_capacity);
        Self::from_providers(Arc::new(provider), Arc::new(pubsub))
    }

    /// Create a manager from existing providers (for testing).
    pub fn from_providers(
        provider: Arc<dyn CacheProvider>,
        pubsub: Arc<dyn PubSubProvider>,
    ) -> Self {
        Self {
            inner: provider,
            pubsub,
        }
    }
}

#[async_trait]
impl CacheProvider for CacheManager {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        self.inner.exists(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        self.inner.expire(key, ttl).await
    }

    async fn list_push(
        &self,
        key: &str,
        value: &str,
        max_len: usize,
        ttl: Duration,
    ) -> AppResult<usize> {
        self.inner.list_push(key, value, max_len, ttl).await
    }

    async fn list_range(&self, key: &str) -> AppResult<Vec<String>> {
        self.inner.list_range(key).await
    }

    async fn list_remove(&self, key: &str, value: &str) -> AppResult<usize> {
        self.inner.list_remove(key, value).await
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.inner.health_check().await
    }
}

#[async_trait]
impl PubSubProvider for CacheManager {
    async fn publish(&self, channel: &str, payload: &str) -> AppResult<()> {
        self.pubsub.publish(channel, payload).await
    }

    async fn subscribe(&self, channel: &str) -> AppResult<BoxStream<'static, String>> {
        self.pubsub.subscribe(channel).await
    }
}
