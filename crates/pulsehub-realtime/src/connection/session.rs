//! A single live connection for one user device.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use pulsehub_core::events::OutboundEvent;
use pulsehub_core::types::id::{ConnectionId, GroupId, UserId};

/// Lifecycle of a Session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SessionState {
    /// Created, not yet in the registry.
    Connecting = 0,
    /// Inserted into the registry.
    Registered = 1,
    /// Has exchanged at least one frame or heartbeat since registration.
    Active = 2,
    /// Being torn down; no further deliveries are attempted.
    Closing = 3,
    /// Outbound mailbox closed. Terminal.
    Closed = 4,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Connecting,
            1 => Self::Registered,
            2 => Self::Active,
            3 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Result of a non-blocking delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Placed on the outbound mailbox.
    Enqueued,
    /// The outbound mailbox is full; the consumer is too slow.
    Full,
    /// The Session is closing or closed.
    Closed,
}

/// One live connection for one authenticated user device.
///
/// The outbound sender is held behind a mutex so that [`Session::close`]
/// can drop it exactly once; dropping the only sender closes the mailbox
/// and ends the connection's write loop.
#[derive(Debug)]
pub struct Session {
    /// Unique connection ID
    pub id: ConnectionId,
    /// User who owns this connection
    pub user_id: UserId,
    /// Groups this Session is subscribed to, fixed at connect time
    groups: HashSet<GroupId>,
    /// Sender for outbound events; `None` once closed
    sender: Mutex<Option<mpsc::Sender<OutboundEvent>>>,
    /// Last time the client was heard from
    last_seen: Mutex<DateTime<Utc>>,
    /// Current [`SessionState`]
    state: AtomicU8,
    /// When the connection was established
    pub connected_at: DateTime<Utc>,
}

impl Session {
    /// Create a new Session and the receiving end of its outbound mailbox.
    pub fn new(
        user_id: UserId,
        groups: HashSet<GroupId>,
        buffer_size: usize,
    ) -> (Arc<Self>, mpsc::Receiver<OutboundEvent>) {
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        let now = Utc::now();
        let session = Arc::new(Self {
            id: ConnectionId::new(),
            user_id,
            groups,
            sender: Mutex::new(Some(tx)),
            last_seen: Mutex::new(now),
            state: AtomicU8::new(SessionState::Connecting as u8),
            connected_at: now,
        });
        (session, rx)
    }

    /// Groups this Session receives group traffic for.
    pub fn groups(&self) -> &HashSet<GroupId> {
        &self.groups
    }

    /// Whether this Session is subscribed to `group`.
    pub fn is_member_of(&self, group: GroupId) -> bool {
        self.groups.contains(&group)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move forward to `to`. Returns `false` if the Session is already at or
    /// past that state.
    pub fn advance(&self, to: SessionState) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (cur < to as u8).then_some(to as u8)
            })
            .is_ok()
    }

    /// Whether the Session is closing or closed.
    pub fn is_closing(&self) -> bool {
        self.state() >= SessionState::Closing
    }

    /// Attempt a non-blocking enqueue onto the outbound mailbox.
    pub fn try_deliver(&self, event: OutboundEvent) -> DeliveryOutcome {
        if self.is_closing() {
            return DeliveryOutcome::Closed;
        }
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            return DeliveryOutcome::Closed;
        };
        match tx.try_send(event) {
            Ok(()) => DeliveryOutcome::Enqueued,
            Err(mpsc::error::TrySendError::Full(_)) => DeliveryOutcome::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => DeliveryOutcome::Closed,
        }
    }

    /// Close the outbound mailbox. Returns `true` only for the call that
    /// actually closed it.
    pub fn close(&self) -> bool {
        self.advance(SessionState::Closing);
        let taken = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.state
            .store(SessionState::Closed as u8, Ordering::Release);
        taken.is_some()
    }

    /// Record client activity.
    pub fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Utc::now();
        if self.state() == SessionState::Registered {
            self.advance(SessionState::Active);
        }
    }

    /// Last time the client was heard from.
    pub fn last_seen(&self) -> DateTime<Utc> {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the Session has been silent for longer than `threshold` at `now`.
    pub fn is_stale_at(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        match (now - self.last_seen()).to_std() {
            Ok(silent) => silent > threshold,
            Err(_) => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn set_last_seen(&self, at: DateTime<Utc>) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }
}
