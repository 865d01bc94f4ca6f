//! Ephemeral signalling events: typing indicators, call signalling, RSVPs.

use serde::{Deserialize, Serialize};

use crate::types::id::{EventId, GroupId, UserId};

/// Typing indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Typing {
    /// The typist.
    pub user_id: UserId,
    /// Direct-conversation peer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<UserId>,
    /// Group conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    /// Started or stopped typing.
    pub is_typing: bool,
}

/// WebRTC-style call signalling between two users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSignal {
    /// Caller.
    pub caller_id: UserId,
    /// Callee.
    pub target_id: UserId,
    /// `offer`, `answer`, `ice_candidate`, `hangup`, ...
    pub signal_type: String,
    /// Opaque signalling body.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// An attendee's RSVP for an event changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RsvpUpdate {
    /// The event.
    pub event_id: EventId,
    /// Responding user.
    pub user_id: UserId,
    /// `going`, `interested`, `declined`, ...
    pub status: String,
    /// Event host.
    pub host_id: UserId,
    /// Additional users to inform.
    #[serde(default)]
    pub recipients: Vec<UserId>,
}

impl RsvpUpdate {
    /// Host plus recipients, without duplicates, in first-seen order.
    pub fn audience(&self) -> Vec<UserId> {
        let mut out = Vec::with_capacity(self.recipients.len() + 1);
        for user in std::iter::once(self.host_id).chain(self.recipients.iter().copied()) {
            if !out.contains(&user) {
                out.push(user);
            }
        }
        out
    }
}
