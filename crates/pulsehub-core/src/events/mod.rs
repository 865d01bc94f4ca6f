//! Event vocabulary shared by every part of the hub.
//!
//! Inbound events arrive as `{"type": ..., "payload": ...}` from clients,
//! producers and peer instances. Outbound events are written to client
//! connections as `{"type": ..., "data": ...}`.

pub mod chat;
pub mod feed;
pub mod outbound;
pub mod presence;
pub mod signal;

pub use chat::{
    ChatMessage, ConversationRef, ConversationSeen, MessageDelivered, MessageEdited,
    MessageTarget, ReactionAction, ReactionChanged, ReadReceipt,
};
pub use feed::{FeedEvent, FeedEventType, FeedPayload, Visibility};
pub use outbound::{NotificationCreated, OutboundEvent};
pub use presence::{PresenceRefresh, PresenceStatus, PresenceUpdate};
pub use signal::{CallSignal, RsvpUpdate, Typing};

use serde::{Deserialize, Serialize};

/// The closed set of events the hub routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum InboundEvent {
    Message(ChatMessage),
    Reaction(ReactionChanged),
    ReadReceipt(ReadReceipt),
    Edit(MessageEdited),
    Delivered(MessageDelivered),
    ConversationSeen(ConversationSeen),
    Typing(Typing),
    CallSignal(CallSignal),
    RsvpUpdate(RsvpUpdate),
    FeedEvent(FeedEvent),
    Presence(PresenceRefresh),
}

impl InboundEvent {
    /// Tag written in the `type` field.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Reaction(_) => "reaction",
            Self::ReadReceipt(_) => "read_receipt",
            Self::Edit(_) => "edit",
            Self::Delivered(_) => "delivered",
            Self::ConversationSeen(_) => "conversation_seen",
            Self::Typing(_) => "typing",
            Self::CallSignal(_) => "call_signal",
            Self::RsvpUpdate(_) => "rsvp_update",
            Self::FeedEvent(_) => "feed_event",
            Self::Presence(_) => "presence",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::id::{MessageId, UserId};

    #[test]
    fn test_inbound_envelope_round_trip() {
        let raw = serde_json::json!({
            "type": "read_receipt",
            "payload": { "reader_id": UserId::new(), "message_ids": [MessageId::new()] }
        });
        let event: InboundEvent = serde_json::from_value(raw).expect("parse");
        assert_eq!(event.event_type(), "read_receipt");
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let raw = r#"{"type":"teleport","payload":{}}"#;
        assert!(serde_json::from_str::<InboundEvent>(raw).is_err());
    }
}
