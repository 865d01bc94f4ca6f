//! Broadcast channel trait used by the cross-instance bridge.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::result::AppResult;

/// Fire-and-forget broadcast between hub instances.
#[async_trait]
pub trait PubSubProvider: Send + Sync + std::fmt::Debug + 'static {
    /// Publish `payload` on `channel`. Returns once the backend accepted it.
    async fn publish(&self, channel: &str, payload: &str) -> AppResult<()>;

    /// Subscribe to `channel`.
    ///
    /// The stream yields raw payloads and ends when the underlying
    /// subscription is lost; callers resubscribe to recover.
    async fn subscribe(&self, channel: &str) -> AppResult<BoxStream<'static, String>>;
}
