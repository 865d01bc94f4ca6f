//! In-process broadcast channel for single-instance deployments.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast;
use tracing::warn;

use pulsehub_core::result::AppResult;
use pulsehub_core::traits::pubsub::PubSubProvider;

/// In-memory pub/sub implementation.
#[derive(Debug)]
pub struct MemoryPubSub {
    /// Channel name → broadcast sender
    channels: DashMap<String, broadcast::Sender<String>>,
    /// Buffer size for channels
    buffer_size: usize,
}

impl MemoryPubSub {
    /// Create a new in-memory pub/sub
    pub fn new(buffer_size: usize) -> Self {
        Self {
            channels: DashMap::new(),
            buffer_size: buffer_size.max(1),
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.buffer_size).0)
            .clone()
    }
}

#[async_trait]
impl PubSubProvider for MemoryPubSub {
    async fn publish(&self, channel: &str, payload: &str) -> AppResult<()> {
        // No subscribers is not an error for a broadcast.
        let _ = self.sender(channel).send(payload.to_string());
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> AppResult<BoxStream<'static, String>> {
        let rx = self.sender(channel).subscribe();
        let channel = channel.to_string();
        let stream = stream::unfold(rx, move |mut rx| {
            let channel = channel.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(payload) => return Some((payload, rx)),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(channel = %channel, skipped, "Broadcast subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_published_payload() {
        let bus = MemoryPubSub::new(8);
        let mut sub = bus.subscribe("bridge").await.unwrap();
        bus.publish("bridge", "hello").await.unwrap();
        assert_eq!(sub.next().await.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = MemoryPubSub::new(8);
        assert!(bus.publish("nobody", "x").await.is_ok());
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let bus = MemoryPubSub::new(8);
        let mut a = bus.subscribe("a").await.unwrap();
        bus.publish("b", "for-b").await.unwrap();
        bus.publish("a", "for-a").await.unwrap();
        assert_eq!(a.next().await.as_deref(), Some("for-a"));
    }
}
