//! Delivery engine: live fan-out with slow-consumer eviction, offline
//! queuing for absent recipients.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use pulsehub_core::events::{
    ChatMessage, ConversationRef, MessageDelivered, MessageTarget, OutboundEvent,
};
use pulsehub_core::result::AppResult;
use pulsehub_core::traits::{GroupDirectory, MessageRepository};
use pulsehub_core::types::id::{GroupId, UserId};

use crate::background::{BackgroundPool, bounded};
use crate::connection::registry::Registry;
use crate::connection::session::{DeliveryOutcome, Session};
use crate::metrics::HubMetrics;
use crate::pending::{MessageCache, OwnerKey, PendingQueue};
use crate::presence::PresenceStore;
use crate::router::ingress::{CloseReason, Ingress};

/// Where a chat message entered this instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Submitted by a local client or the local API; this instance owns
    /// offline queuing for it.
    Local,
    /// Relayed from another instance, which already queued it for absent
    /// recipients.
    Bridge,
}

/// What a dispatch did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Sessions the message was enqueued on by the router itself
    pub delivered: usize,
    /// Direct pending entries appended; group entries are queued in the
    /// background
    pub queued: usize,
}

/// Resolves recipients and performs non-blocking delivery.
#[derive(Clone)]
pub struct DeliveryEngine {
    registry: Arc<Registry>,
    pending: Arc<PendingQueue>,
    contents: Arc<MessageCache>,
    presence: PresenceStore,
    groups: Arc<dyn GroupDirectory>,
    messages: Arc<dyn MessageRepository>,
    background: Arc<BackgroundPool>,
    ingress: Ingress,
    metrics: Arc<HubMetrics>,
    timeout: Duration,
}

impl std::fmt::Debug for DeliveryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryEngine")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl DeliveryEngine {
    /// Creates an engine; every store and collaborator call it makes is
    /// bounded by `timeout`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<Registry>,
        pending: Arc<PendingQueue>,
        contents: Arc<MessageCache>,
        presence: PresenceStore,
        groups: Arc<dyn GroupDirectory>,
        messages: Arc<dyn MessageRepository>,
        background: Arc<BackgroundPool>,
        ingress: Ingress,
        metrics: Arc<HubMetrics>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            pending,
            contents,
            presence,
            groups,
            messages,
            background,
            ingress,
            metrics,
            timeout,
        }
    }

    /// Delivers a chat message to its live recipients and, for local
    /// messages, queues it for recipients connected nowhere.
    pub async fn dispatch(
        &self,
        message: ChatMessage,
        provenance: Provenance,
    ) -> AppResult<DispatchReport> {
        match message.target()? {
            MessageTarget::Direct(receiver) => {
                self.dispatch_direct(receiver, message, provenance).await
            }
            MessageTarget::Group(group) => Ok(self.dispatch_group(group, message, provenance)),
        }
    }

    async fn dispatch_direct(
        &self,
        receiver: UserId,
        message: ChatMessage,
        provenance: Provenance,
    ) -> AppResult<DispatchReport> {
        let sessions = self.registry.by_user(receiver);
        let delivered = self.fan_out(&sessions, &OutboundEvent::Message(message.clone()));

        if delivered > 0 {
            self.acknowledge(receiver, &message);
            return Ok(DispatchReport {
                delivered,
                queued: 0,
            });
        }
        if provenance == Provenance::Bridge {
            return Ok(DispatchReport::default());
        }
        if self.online_elsewhere(receiver).await {
            debug!(message_id = %message.id, user_id = %receiver, "Recipient connected to another instance, not queued");
            return Ok(DispatchReport::default());
        }

        self.cache_body(&message).await;
        bounded(
            self.timeout,
            self.pending.enqueue(&OwnerKey::User(receiver), message.id),
        )
        .await?;
        debug!(message_id = %message.id, user_id = %receiver, "Recipient offline, message queued");
        Ok(DispatchReport {
            delivered: 0,
            queued: 1,
        })
    }

    /// Live delivery to subscribed Sessions happens here; membership
    /// resolution and queuing for the rest run in the background.
    fn dispatch_group(&self, group: GroupId, message: ChatMessage, provenance: Provenance) -> DispatchReport {
        let event = OutboundEvent::Message(message.clone());
        let mut report = DispatchReport::default();
        let mut reached = HashSet::new();

        for session in self.registry.by_group(group) {
            if self.deliver(&session, event.clone()) == DeliveryOutcome::Enqueued {
                report.delivered += 1;
                reached.insert(session.user_id);
            }
        }

        let engine = self.clone();
        let message_id = message.id;
        // Membership, presence, body and enqueue each get one timeout.
        let deadline = self.timeout * 4;
        let spawned = self
            .background
            .spawn_with_deadline("group_pending", deadline, async move {
                engine
                    .reach_absent_members(group, message, reached, provenance)
                    .await
            });
        if !spawned {
            warn!(group_id = %group, message_id = %message_id, "Absent group members not reached");
        }
        report
    }

    async fn reach_absent_members(
        &self,
        group: GroupId,
        message: ChatMessage,
        reached: HashSet<UserId>,
        provenance: Provenance,
    ) -> AppResult<()> {
        let members = bounded(self.timeout, self.groups.members(group)).await?;
        let event = OutboundEvent::Message(message.clone());

        let mut absent = Vec::new();
        for member in members {
            if member == message.sender_id || reached.contains(&member) {
                continue;
            }
            // Connected but not subscribed to the group on this Session.
            if self.fan_out(&self.registry.by_user(member), &event) == 0 {
                absent.push(member);
            }
        }
        if absent.is_empty() || provenance == Provenance::Bridge {
            return Ok(());
        }

        let online = join_all(absent.iter().map(|member| self.online_elsewhere(*member))).await;
        let offline: Vec<UserId> = absent
            .into_iter()
            .zip(online)
            .filter_map(|(member, online)| (!online).then_some(member))
            .collect();
        if offline.is_empty() {
            return Ok(());
        }

        self.cache_body(&message).await;
        let owners: Vec<OwnerKey> = offline
            .into_iter()
            .map(|member| OwnerKey::GroupMember { group, member })
            .collect();
        let results = join_all(
            owners
                .iter()
                .map(|owner| bounded(self.timeout, self.pending.enqueue(owner, message.id))),
        )
        .await;
        let mut queued = 0usize;
        for (owner, result) in owners.iter().zip(results) {
            match result {
                Ok(()) => queued += 1,
                Err(e) => {
                    warn!(owner = %owner, message_id = %message.id, error = %e, "Failed to queue group message")
                }
            }
        }
        debug!(group_id = %group, message_id = %message.id, queued, "Group message queued for absent members");
        Ok(())
    }

    /// Whether the shared presence record says `user` is online on some
    /// instance. A failed lookup counts as offline so the message is kept.
    async fn online_elsewhere(&self, user: UserId) -> bool {
        match bounded(self.timeout, self.presence.is_online(user)).await {
            Ok(online) => online,
            Err(e) => {
                warn!(user_id = %user, error = %e, "Presence lookup failed, queuing");
                false
            }
        }
    }

    /// Non-blocking enqueue onto one Session.
    ///
    /// A full mailbox marks the Session as a slow consumer: it is closed
    /// at once and its removal is handed to the router.
    pub fn deliver(&self, session: &Session, event: OutboundEvent) -> DeliveryOutcome {
        let event_type = event.event_type();
        let outcome = session.try_deliver(event);
        match outcome {
            DeliveryOutcome::Enqueued => self.metrics.events_delivered(1),
            DeliveryOutcome::Full => {
                warn!(
                    conn_id = %session.id,
                    user_id = %session.user_id,
                    event_type,
                    "Outbound mailbox full, evicting slow consumer"
                );
                self.metrics.slow_consumer_evicted();
                session.close();
                self.ingress.unregister(session.id, CloseReason::SlowConsumer);
            }
            DeliveryOutcome::Closed => {
                debug!(conn_id = %session.id, event_type, "Skipping closed Session");
            }
        }
        outcome
    }

    /// Non-blocking enqueue that leaves a full Session alone.
    ///
    /// Used for catch-up traffic to a freshly registered Session, which
    /// must not cost it the connection.
    pub fn offer(&self, session: &Session, event: OutboundEvent) -> DeliveryOutcome {
        let outcome = session.try_deliver(event);
        if outcome == DeliveryOutcome::Enqueued {
            self.metrics.events_delivered(1);
        }
        outcome
    }

    /// Delivers a copy of `event` to each Session; returns how many accepted it.
    pub fn fan_out(&self, sessions: &[Arc<Session>], event: &OutboundEvent) -> usize {
        sessions
            .iter()
            .filter(|s| self.deliver(s, event.clone()) == DeliveryOutcome::Enqueued)
            .count()
    }

    /// Delivers to every live Session of each listed user.
    pub fn to_users<I>(&self, users: I, event: &OutboundEvent) -> usize
    where
        I: IntoIterator<Item = UserId>,
    {
        let unique: HashSet<UserId> = users.into_iter().collect();
        unique
            .into_iter()
            .map(|user| self.fan_out(&self.registry.by_user(user), event))
            .sum()
    }

    /// Delivers to every live Session subscribed to `group`, optionally
    /// skipping one user's Sessions.
    pub fn to_group(&self, group: GroupId, event: &OutboundEvent, exclude: Option<UserId>) -> usize {
        let sessions: Vec<_> = self
            .registry
            .by_group(group)
            .into_iter()
            .filter(|s| Some(s.user_id) != exclude)
            .collect();
        self.fan_out(&sessions, event)
    }

    /// Delivers to every live Session on this instance.
    pub fn to_everyone(&self, event: &OutboundEvent) -> usize {
        self.fan_out(&self.registry.all(), event)
    }

    async fn cache_body(&self, message: &ChatMessage) {
        if let Err(e) = bounded(self.timeout, self.contents.store(message)).await {
            warn!(message_id = %message.id, error = %e, "Failed to cache message body");
        }
    }

    /// Marks a direct message delivered, then tells the sender's Sessions.
    fn acknowledge(&self, receiver: UserId, message: &ChatMessage) {
        let engine = self.clone();
        let sender = message.sender_id;
        let id = message.id;
        self.background.spawn("delivery_ack", async move {
            let ids = [id];
            let ack = engine
                .messages
                .mark_delivered(receiver, ConversationRef::Direct(sender), &ids);
            if let Err(e) = bounded(engine.timeout, ack).await {
                warn!(message_id = %id, user_id = %receiver, error = %e, "Mark delivered failed");
            }
            let event = OutboundEvent::Delivered(MessageDelivered {
                message_ids: vec![id],
                deliverer_id: receiver,
            });
            engine.to_users([sender], &event);
            Ok(())
        });
    }
}
