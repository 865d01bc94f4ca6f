//! Publishing side of the bridge.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use pulsehub_cache::CacheManager;
use pulsehub_core::events::{ChatMessage, InboundEvent};
use pulsehub_core::result::AppResult;
use pulsehub_core::traits::PubSubProvider;

use super::BridgeEnvelope;

/// Places events on the broadcast channel on behalf of this instance.
#[derive(Debug, Clone)]
pub struct BridgePublisher {
    bus: Arc<CacheManager>,
    channel: String,
    origin: Uuid,
}

impl BridgePublisher {
    pub fn new(bus: Arc<CacheManager>, channel: impl Into<String>, origin: Uuid) -> Self {
        Self {
            bus,
            channel: channel.into(),
            origin,
        }
    }

    /// Instance ID stamped on every envelope.
    pub fn origin(&self) -> Uuid {
        self.origin
    }

    /// Broadcasts a chat message to every other instance.
    pub async fn publish(&self, message: &ChatMessage) -> AppResult<()> {
        self.publish_event(InboundEvent::Message(message.clone())).await
    }

    /// Broadcasts any inbound event to every other instance.
    pub async fn publish_event(&self, event: InboundEvent) -> AppResult<()> {
        let event_type = event.event_type();
        let envelope = BridgeEnvelope {
            origin: self.origin,
            event,
        };
        let payload = serde_json::to_string(&envelope)?;
        self.bus.publish(&self.channel, &payload).await?;
        debug!(event_type, channel = %self.channel, "Published to bridge");
        Ok(())
    }
}
