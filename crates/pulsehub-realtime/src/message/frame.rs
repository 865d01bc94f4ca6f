//! Frames a connected client may send.

use serde::Deserialize;

use pulsehub_core::events::{CallSignal, ChatMessage, Typing};
use pulsehub_core::types::id::{GroupId, UserId};

/// Client-to-server frame: `{"type": ..., "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Typing indicator; the typist is always the Session's user.
    Typing(TypingFrame),
    /// Chat message; the embedded sender must be the Session's user.
    Message(ChatMessage),
    /// Call signalling; the caller is always the Session's user.
    CallSignal(CallSignalFrame),
    /// Heartbeat refresh.
    Presence(PresenceFrame),
}

/// Body of a `typing` frame. Any typist the client names is ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TypingFrame {
    #[serde(default)]
    pub receiver_id: Option<UserId>,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    pub is_typing: bool,
}

impl TypingFrame {
    /// The indicator as sent by `user`.
    pub fn into_typing(self, user: UserId) -> Typing {
        Typing {
            user_id: user,
            receiver_id: self.receiver_id,
            group_id: self.group_id,
            is_typing: self.is_typing,
        }
    }
}

/// Body of a `call_signal` frame. Any caller the client names is ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CallSignalFrame {
    pub target_id: UserId,
    pub signal_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl CallSignalFrame {
    /// The signal as placed by `caller`.
    pub fn into_signal(self, caller: UserId) -> CallSignal {
        CallSignal {
            caller_id: caller,
            target_id: self.target_id,
            signal_type: self.signal_type,
            payload: self.payload,
        }
    }
}

/// Body of a `presence` frame. Carries nothing the hub relies on.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PresenceFrame {
    /// Client-reported status, informational only.
    #[serde(default)]
    pub status: Option<String>,
}

impl ClientFrame {
    /// Tag of this frame.
    pub fn frame_type(&self) -> &'static str {
        match self {
            Self::Typing(_) => "typing",
            Self::Message(_) => "message",
            Self::CallSignal(_) => "call_signal",
            Self::Presence(_) => "presence",
        }
    }
}
