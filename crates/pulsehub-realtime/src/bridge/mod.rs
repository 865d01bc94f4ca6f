//! Cross-instance bridge over the shared broadcast channel.
//!
//! Whoever consumes a message from the durable log publishes it here so
//! that every instance holding a live Session for a recipient can deliver
//! it. Each envelope names the instance that published it, and that
//! instance ignores its own echo.

pub mod publisher;
pub mod subscriber;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pulsehub_core::events::InboundEvent;

pub use publisher::BridgePublisher;
pub use subscriber::BridgeSubscriber;

/// Payload carried on the broadcast channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeEnvelope {
    /// Instance that published the event.
    pub origin: Uuid,
    /// The event itself, in inbound form.
    pub event: InboundEvent,
}
