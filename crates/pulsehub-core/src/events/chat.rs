//! Chat events: messages and the per-message side channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::result::AppResult;
use crate::types::id::{GroupId, MessageId, UserId};

/// Where a conversation-scoped event is headed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageTarget {
    /// One recipient user.
    Direct(UserId),
    /// Every member of a group.
    Group(GroupId),
}

impl MessageTarget {
    /// Resolves a target from the optional receiver/group pair carried on
    /// the wire. Exactly one of the two must be present.
    pub fn resolve(receiver_id: Option<UserId>, group_id: Option<GroupId>) -> AppResult<Self> {
        match (receiver_id, group_id) {
            (Some(receiver), None) => Ok(Self::Direct(receiver)),
            (None, Some(group)) => Ok(Self::Group(group)),
            (Some(_), Some(_)) => Err(AppError::validation(
                "Event names both a receiver and a group",
            )),
            (None, None) => Err(AppError::validation("Event names neither receiver nor group")),
        }
    }
}

/// Identifies a conversation for delivery acknowledgments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ConversationRef {
    /// A one-to-one conversation, identified by the peer.
    Direct(UserId),
    /// A group conversation.
    Group(GroupId),
}

/// A direct or group chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message ID.
    pub id: MessageId,
    /// Author.
    pub sender_id: UserId,
    /// Recipient for direct messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<UserId>,
    /// Group for group messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    /// Message body.
    pub content: String,
    /// MIME-like content type (`text`, `image`, ...).
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// Creation time.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Returns the message's target, rejecting malformed addressing.
    pub fn target(&self) -> AppResult<MessageTarget> {
        MessageTarget::resolve(self.receiver_id, self.group_id)
    }
}

fn default_content_type() -> String {
    "text".to_string()
}

/// Whether a reaction was added or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionAction {
    /// Reaction added.
    Added,
    /// Reaction removed.
    Removed,
}

/// A reaction on a chat message changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionChanged {
    /// Message reacted to.
    pub message_id: MessageId,
    /// Reacting user.
    pub user_id: UserId,
    /// Reaction glyph.
    pub emoji: String,
    /// Added or removed.
    pub action: ReactionAction,
    /// Direct-conversation peer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<UserId>,
    /// Group conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
}

/// A user read one or more messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadReceipt {
    /// Reader.
    pub reader_id: UserId,
    /// Messages read.
    pub message_ids: Vec<MessageId>,
}

/// A stored message's content was edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEdited {
    /// Edited message.
    pub message_id: MessageId,
    /// Editor (normally the author).
    pub editor_id: UserId,
    /// Replacement content.
    pub new_content: String,
}

/// One or more messages reached a device of `deliverer_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDelivered {
    /// Delivered messages.
    pub message_ids: Vec<MessageId>,
    /// The recipient whose device received them.
    pub deliverer_id: UserId,
}

/// A user has seen a whole conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSeen {
    /// Viewer.
    pub user_id: UserId,
    /// Direct-conversation peer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<UserId>,
    /// Group conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    /// When it was seen.
    #[serde(default = "Utc::now")]
    pub seen_at: DateTime<Utc>,
}
