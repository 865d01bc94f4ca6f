//! Typed inbound mailboxes feeding the router.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use pulsehub_core::error::AppError;
use pulsehub_core::events::{
    CallSignal, ChatMessage, ConversationSeen, FeedEvent, InboundEvent, MessageDelivered,
    MessageEdited, PresenceRefresh, ReactionChanged, ReadReceipt, RsvpUpdate, Typing,
};
use pulsehub_core::result::AppResult;
use pulsehub_core::types::id::ConnectionId;

use crate::connection::session::Session;
use crate::metrics::HubMetrics;

/// Why a Session is being removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client went away or its I/O failed.
    Disconnected,
    /// Its outbound mailbox overflowed.
    SlowConsumer,
    /// The reaper found it silent for too long.
    Stale,
    /// The hub is stopping.
    Shutdown,
}

impl CloseReason {
    /// Label used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::SlowConsumer => "slow_consumer",
            Self::Stale => "stale",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Producer side of every router mailbox.
///
/// Every send is non-blocking: a full mailbox drops the event with a
/// warning and a metric. Unregistrations are the one exception and are
/// never lost.
#[derive(Clone)]
pub struct Ingress {
    register: mpsc::Sender<Arc<Session>>,
    unregister: mpsc::Sender<(ConnectionId, CloseReason)>,
    message: mpsc::Sender<ChatMessage>,
    relayed: mpsc::Sender<ChatMessage>,
    reaction: mpsc::Sender<ReactionChanged>,
    receipt: mpsc::Sender<ReadReceipt>,
    edit: mpsc::Sender<MessageEdited>,
    delivered: mpsc::Sender<MessageDelivered>,
    seen: mpsc::Sender<ConversationSeen>,
    typing: mpsc::Sender<Typing>,
    call: mpsc::Sender<CallSignal>,
    rsvp: mpsc::Sender<RsvpUpdate>,
    feed: mpsc::Sender<FeedEvent>,
    presence: mpsc::Sender<PresenceRefresh>,
    metrics: Arc<HubMetrics>,
}

impl fmt::Debug for Ingress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ingress").finish()
    }
}

/// Consumer side, owned by the router.
pub(crate) struct Mailboxes {
    pub register: mpsc::Receiver<Arc<Session>>,
    pub unregister: mpsc::Receiver<(ConnectionId, CloseReason)>,
    pub message: mpsc::Receiver<ChatMessage>,
    /// Chat messages that arrived over the bridge
    pub relayed: mpsc::Receiver<ChatMessage>,
    pub reaction: mpsc::Receiver<ReactionChanged>,
    pub receipt: mpsc::Receiver<ReadReceipt>,
    pub edit: mpsc::Receiver<MessageEdited>,
    pub delivered: mpsc::Receiver<MessageDelivered>,
    pub seen: mpsc::Receiver<ConversationSeen>,
    pub typing: mpsc::Receiver<Typing>,
    pub call: mpsc::Receiver<CallSignal>,
    pub rsvp: mpsc::Receiver<RsvpUpdate>,
    pub feed: mpsc::Receiver<FeedEvent>,
    pub presence: mpsc::Receiver<PresenceRefresh>,
}

/// Creates every mailbox with `capacity` slots.
pub(crate) fn mailboxes(capacity: usize, metrics: Arc<HubMetrics>) -> (Ingress, Mailboxes) {
    let capacity = capacity.max(1);
    let (register_tx, register) = mpsc::channel(capacity);
    let (unregister_tx, unregister) = mpsc::channel(capacity);
    let (message_tx, message) = mpsc::channel(capacity);
    let (relayed_tx, relayed) = mpsc::channel(capacity);
    let (reaction_tx, reaction) = mpsc::channel(capacity);
    let (receipt_tx, receipt) = mpsc::channel(capacity);
    let (edit_tx, edit) = mpsc::channel(capacity);
    let (delivered_tx, delivered) = mpsc::channel(capacity);
    let (seen_tx, seen) = mpsc::channel(capacity);
    let (typing_tx, typing) = mpsc::channel(capacity);
    let (call_tx, call) = mpsc::channel(capacity);
    let (rsvp_tx, rsvp) = mpsc::channel(capacity);
    let (feed_tx, feed) = mpsc::channel(capacity);
    let (presence_tx, presence) = mpsc::channel(capacity);

    let ingress = Ingress {
        register: register_tx,
        unregister: unregister_tx,
        message: message_tx,
        relayed: relayed_tx,
        reaction: reaction_tx,
        receipt: receipt_tx,
        edit: edit_tx,
        delivered: delivered_tx,
        seen: seen_tx,
        typing: typing_tx,
        call: call_tx,
        rsvp: rsvp_tx,
        feed: feed_tx,
        presence: presence_tx,
        metrics,
    };
    let mailboxes = Mailboxes {
        register,
        unregister,
        message,
        relayed,
        reaction,
        receipt,
        edit,
        delivered,
        seen,
        typing,
        call,
        rsvp,
        feed,
        presence,
    };
    (ingress, mailboxes)
}

impl Ingress {
    /// Offers an event to its typed mailbox. Returns `false` if it was dropped.
    pub fn submit(&self, event: InboundEvent) -> bool {
        let event_type = event.event_type();
        match event {
            InboundEvent::Message(m) => self.offer(&self.message, m, event_type),
            InboundEvent::Reaction(r) => self.offer(&self.reaction, r, event_type),
            InboundEvent::ReadReceipt(r) => self.offer(&self.receipt, r, event_type),
            InboundEvent::Edit(e) => self.offer(&self.edit, e, event_type),
            InboundEvent::Delivered(d) => self.offer(&self.delivered, d, event_type),
            InboundEvent::ConversationSeen(s) => self.offer(&self.seen, s, event_type),
            InboundEvent::Typing(t) => self.offer(&self.typing, t, event_type),
            InboundEvent::CallSignal(c) => self.offer(&self.call, c, event_type),
            InboundEvent::RsvpUpdate(r) => self.offer(&self.rsvp, r, event_type),
            InboundEvent::FeedEvent(f) => self.offer(&self.feed, f, event_type),
            InboundEvent::Presence(p) => self.offer(&self.presence, p, event_type),
        }
    }

    /// Shorthand for direct and group chat messages.
    pub fn submit_message(&self, message: ChatMessage) -> bool {
        self.offer(&self.message, message, "message")
    }

    /// Like [`Ingress::submit`] for events relayed by another instance.
    ///
    /// Chat messages land on their own mailbox so the router delivers
    /// them live without queuing them a second time.
    pub fn submit_relayed(&self, event: InboundEvent) -> bool {
        match event {
            InboundEvent::Message(m) => self.offer(&self.relayed, m, "message"),
            other => self.submit(other),
        }
    }

    /// Hands a new Session to the router for registration.
    pub fn register(&self, session: Arc<Session>) -> AppResult<()> {
        match self.register.try_send(session) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(session)) => {
                warn!(conn_id = %session.id, user_id = %session.user_id, "Register mailbox full, refusing Session");
                self.metrics.inbound_dropped();
                Err(AppError::service_unavailable("Hub is at capacity"))
            }
            Err(TrySendError::Closed(_)) => {
                Err(AppError::service_unavailable("Hub is shutting down"))
            }
        }
    }

    /// Asks the router to remove a Session.
    pub fn unregister(&self, id: ConnectionId, reason: CloseReason) {
        match self.unregister.try_send((id, reason)) {
            Ok(()) => {}
            Err(TrySendError::Full(item)) => {
                debug!(conn_id = %id, "Unregister mailbox full, deferring");
                let tx = self.unregister.clone();
                tokio::spawn(async move {
                    let _ = tx.send(item).await;
                });
            }
            Err(TrySendError::Closed(_)) => {
                debug!(conn_id = %id, %reason, "Router stopped, unregister ignored");
            }
        }
    }

    fn offer<T>(&self, tx: &mpsc::Sender<T>, item: T, event_type: &'static str) -> bool {
        match tx.try_send(item) {
            Ok(()) => {
                self.metrics.event_received();
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(event_type, "Inbound mailbox full, dropping event");
                self.metrics.inbound_dropped();
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(event_type, "Router stopped, dropping event");
                self.metrics.inbound_dropped();
                false
            }
        }
    }
}
