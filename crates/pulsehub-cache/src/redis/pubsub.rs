//! Redis pub/sub for multi-instance deployments.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use redis::AsyncCommands;
use tracing::{info, warn};

use pulsehub_core::result::AppResult;
use pulsehub_core::traits::pubsub::PubSubProvider;

use super::client::RedisClient;
use super::operations::RedisCacheProvider;

/// Redis pub/sub over the shared store's connection.
///
/// Publishing reuses the managed connection; each subscription opens a
/// dedicated pub/sub connection that is dropped with the stream.
#[derive(Debug, Clone)]
pub struct RedisPubSub {
    client: RedisClient,
}

impl RedisPubSub {
    /// Creates a pub/sub provider sharing `client`.
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PubSubProvider for RedisPubSub {
    async fn publish(&self, channel: &str, payload: &str) -> AppResult<()> {
        let mut conn = self.client.conn_mut();
        let _: i64 = conn
            .publish(channel, payload)
            .await
            .map_err(RedisCacheProvider::map_err)?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> AppResult<BoxStream<'static, String>> {
        let mut pubsub = self
            .client
            .client()
            .get_async_pubsub()
            .await
            .map_err(RedisCacheProvider::map_err)?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(RedisCacheProvider::map_err)?;

        info!(channel, "Subscribed to Redis channel");

        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| async move {
                match msg.get_payload::<String>() {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        warn!(error = %e, "Dropping non-text pub/sub payload");
                        None
                    }
                }
            });
        Ok(stream.boxed())
    }
}
