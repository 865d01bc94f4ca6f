//! Events written to client connections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::chat::{
    ChatMessage, ConversationSeen, MessageDelivered, MessageEdited, ReactionChanged, ReadReceipt,
};
use super::feed::{FeedEvent, FeedEventType};
use super::presence::PresenceUpdate;
use super::signal::{CallSignal, RsvpUpdate, Typing};
use crate::types::id::{ContentId, UserId};

/// In-app notification raised by a feed interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationCreated {
    /// User being notified.
    pub recipient_id: UserId,
    /// User who caused it.
    pub actor_id: UserId,
    /// The feed change behind it.
    pub kind: FeedEventType,
    /// The item that was commented on or replied to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<ContentId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Server-to-client frame: `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OutboundEvent {
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
    PresenceUpdate(PresenceUpdate),
    NotificationCreated(NotificationCreated),
    /// Keep-alive ping.
    Ping { timestamp: i64 },
    /// Rejection of a client frame.
    Error { code: String, message: String },
}

impl OutboundEvent {
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
            Self::PresenceUpdate(_) => "presence_update",
            Self::NotificationCreated(_) => "notification_created",
            Self::Ping { .. } => "ping",
            Self::Error { .. } => "error",
        }
    }

    /// Builds an error frame.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Builds a ping frame stamped now.
    pub fn ping() -> Self {
        Self::Ping {
            timestamp: Utc::now().timestamp(),
        }
    }

    /// Serializes to JSON text.
    pub fn to_json(&self) -> crate::result::AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
