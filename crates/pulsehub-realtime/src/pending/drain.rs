//! Replays a reconnecting owner's pending entries onto its new Session.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use pulsehub_core::events::{ChatMessage, OutboundEvent};
use pulsehub_core::result::AppResult;
use pulsehub_core::traits::GroupDirectory;
use pulsehub_core::types::id::{GroupId, MessageId};

use crate::background::bounded;
use crate::connection::session::{DeliveryOutcome, Session};
use crate::delivery::DeliveryEngine;
use crate::metrics::HubMetrics;

use super::content::MessageCache;
use super::queue::{OwnerKey, PendingQueue};

/// Pause between attempts while the outbound mailbox is full.
const FULL_BACKOFF: Duration = Duration::from_millis(25);
/// Attempts per entry before the drain gives up and leaves the rest queued.
const FULL_RETRIES: usize = 40;

/// Outcome of one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Entries delivered and removed
    pub delivered: usize,
    /// Entries removed without delivery because they no longer apply
    pub discarded: usize,
    /// Whether the drain stopped early because the Session went away or
    /// stayed full
    pub interrupted: bool,
}

/// Drains direct and per-group pending lists for one Session.
pub struct PendingDrainer {
    pending: Arc<PendingQueue>,
    contents: Arc<MessageCache>,
    groups: Arc<dyn GroupDirectory>,
    delivery: DeliveryEngine,
    metrics: Arc<HubMetrics>,
    timeout: Duration,
}

impl std::fmt::Debug for PendingDrainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingDrainer").finish()
    }
}

impl PendingDrainer {
    /// Creates a drainer; group membership checks are bounded by `timeout`.
    pub fn new(
        pending: Arc<PendingQueue>,
        contents: Arc<MessageCache>,
        groups: Arc<dyn GroupDirectory>,
        delivery: DeliveryEngine,
        metrics: Arc<HubMetrics>,
        timeout: Duration,
    ) -> Self {
        Self {
            pending,
            contents,
            groups,
            delivery,
            metrics,
            timeout,
        }
    }

    /// Delivers every applicable pending entry to `session`, oldest first.
    ///
    /// An entry is removed only once it sits on the outbound mailbox, or
    /// when it no longer applies (body gone, membership gone, wrong
    /// conversation). Stops at the first entry the Session will not take;
    /// what is left stays queued for the next connect.
    pub async fn drain(&self, session: Arc<Session>) -> AppResult<DrainReport> {
        let mut report = DrainReport::default();
        let user = session.user_id;

        let direct = OwnerKey::User(user);
        let ids = self.pending.list(&direct).await?;
        if !self.drain_owner(&session, &direct, ids, None, &mut report).await? {
            report.interrupted = true;
            return Ok(report);
        }

        for group in session.groups().iter().copied() {
            let owner = OwnerKey::GroupMember {
                group,
                member: user,
            };
            let ids = self.pending.list(&owner).await?;
            if ids.is_empty() {
                continue;
            }

            match bounded(self.timeout, self.groups.members(group)).await {
                Ok(members) if !members.contains(&user) => {
                    debug!(user_id = %user, group_id = %group, "No longer a member, discarding pending entries");
                    for id in dedup(ids) {
                        self.pending.remove(&owner, id).await?;
                        report.discarded += 1;
                    }
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(user_id = %user, group_id = %group, error = %e, "Membership check failed, leaving group entries queued");
                    continue;
                }
            }

            if !self
                .drain_owner(&session, &owner, ids, Some(group), &mut report)
                .await?
            {
                report.interrupted = true;
                break;
            }
        }

        if report.delivered > 0 || report.discarded > 0 {
            info!(
                conn_id = %session.id,
                user_id = %user,
                delivered = report.delivered,
                discarded = report.discarded,
                "Pending entries drained"
            );
        }
        Ok(report)
    }

    /// Returns `false` when the Session stopped accepting deliveries.
    ///
    /// A failed body load leaves the entry queued and moves on.
    async fn drain_owner(
        &self,
        session: &Arc<Session>,
        owner: &OwnerKey,
        ids: Vec<MessageId>,
        group: Option<GroupId>,
        report: &mut DrainReport,
    ) -> AppResult<bool> {
        for id in dedup(ids) {
            let message = match self.contents.load(id).await {
                Ok(Some(m)) => m,
                Ok(None) => {
                    debug!(owner = %owner, message_id = %id, "Pending message vanished");
                    self.pending.remove(owner, id).await?;
                    report.discarded += 1;
                    continue;
                }
                Err(e) => {
                    warn!(owner = %owner, message_id = %id, error = %e, "Could not load pending message");
                    continue;
                }
            };

            if !applies_to(&message, session, group) {
                self.pending.remove(owner, id).await?;
                report.discarded += 1;
                continue;
            }

            if !self.hand_over(session, message).await {
                debug!(conn_id = %session.id, owner = %owner, "Session not accepting, leaving the rest queued");
                return Ok(false);
            }
            bounded(self.timeout, self.pending.remove(owner, id)).await?;
            self.metrics.pending_drained();
            report.delivered += 1;
        }
        Ok(true)
    }

    /// Places one message on the Session, waiting out a full mailbox for
    /// up to `FULL_RETRIES` attempts. A backlog never evicts the Session.
    async fn hand_over(&self, session: &Session, message: ChatMessage) -> bool {
        let event = OutboundEvent::Message(message);
        for _ in 0..FULL_RETRIES {
            match self.delivery.offer(session, event.clone()) {
                DeliveryOutcome::Enqueued => return true,
                DeliveryOutcome::Closed => return false,
                DeliveryOutcome::Full => tokio::time::sleep(FULL_BACKOFF).await,
            }
        }
        false
    }
}

/// Whether a queued message still belongs on this Session's list.
fn applies_to(message: &ChatMessage, session: &Session, group: Option<GroupId>) -> bool {
    match group {
        Some(group) => message.group_id == Some(group) && session.is_member_of(group),
        None => message.group_id.is_none() && message.receiver_id == Some(session.user_id),
    }
}

fn dedup(ids: Vec<MessageId>) -> Vec<MessageId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}
