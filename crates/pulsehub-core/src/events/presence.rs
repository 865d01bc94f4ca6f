//! Presence events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::id::UserId;

/// A user's coarse online state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    /// At least one live Session somewhere.
    Online,
    /// No live Session.
    Offline,
}

impl PresenceStatus {
    /// Converts to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

/// Presence snapshot for one user. Also the shape of the shared record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceUpdate {
    /// Subject user.
    pub user_id: UserId,
    /// Current status.
    pub status: PresenceStatus,
    /// Last time the user was seen.
    pub last_seen: DateTime<Utc>,
}

impl PresenceUpdate {
    /// Online snapshot stamped now.
    pub fn online(user_id: UserId) -> Self {
        Self {
            user_id,
            status: PresenceStatus::Online,
            last_seen: Utc::now(),
        }
    }

    /// Offline snapshot stamped now.
    pub fn offline(user_id: UserId) -> Self {
        Self {
            user_id,
            status: PresenceStatus::Offline,
            last_seen: Utc::now(),
        }
    }
}

/// Heartbeat refresh for a connected user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRefresh {
    /// The user whose presence is refreshed.
    pub user_id: UserId,
}
