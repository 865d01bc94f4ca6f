//! Presence tracker: marks users online/offline and tells the people
//! who care.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use pulsehub_core::events::{OutboundEvent, PresenceUpdate};
use pulsehub_core::result::AppResult;
use pulsehub_core::traits::{CounterpartLookup, RelationshipLookup};
use pulsehub_core::types::id::UserId;

use crate::background::bounded;
use crate::connection::registry::Registry;
use crate::connection::session::Session;
use crate::delivery::DeliveryEngine;

use super::status::PresenceStore;

/// Relationship-scoped presence fan-out.
///
/// Notification cost is bounded by the size of a user's relations and
/// active counterparts, never by the number of connected users.
pub struct PresenceTracker {
    store: PresenceStore,
    registry: Arc<Registry>,
    delivery: DeliveryEngine,
    relations: Arc<dyn RelationshipLookup>,
    counterparts: Arc<dyn CounterpartLookup>,
    timeout: Duration,
}

impl std::fmt::Debug for PresenceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceTracker").finish()
    }
}

impl PresenceTracker {
    /// Create a new presence tracker
    pub fn new(
        store: PresenceStore,
        registry: Arc<Registry>,
        delivery: DeliveryEngine,
        relations: Arc<dyn RelationshipLookup>,
        counterparts: Arc<dyn CounterpartLookup>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            delivery,
            relations,
            counterparts,
            timeout,
        }
    }

    /// Shared presence records
    pub fn store(&self) -> &PresenceStore {
        &self.store
    }

    /// A Session was registered.
    ///
    /// Marks the user online, exchanges online status with every online
    /// counterpart, then sends the user's own snapshot to the new Session.
    pub async fn on_register(&self, session: Arc<Session>) -> AppResult<()> {
        let user = session.user_id;
        let own = match self.store.mark_online(user).await {
            Ok(record) => record,
            Err(e) => {
                warn!(user_id = %user, error = %e, "Failed to mark user online");
                PresenceUpdate::online(user)
            }
        };

        let announce = OutboundEvent::PresenceUpdate(own.clone());
        let mut notified = 0;
        for peer in self.counterparts_of(user).await {
            let Some(status) = self.online_status(peer).await else {
                continue;
            };
            self.delivery
                .offer(&session, OutboundEvent::PresenceUpdate(status));
            notified += self.delivery.to_users([peer], &announce);
        }

        self.delivery.offer(&session, announce);
        debug!(user_id = %user, notified, "Online presence announced");
        Ok(())
    }

    /// A Session was removed.
    ///
    /// Only the user's last local Session going away marks them offline.
    pub async fn on_unregister(&self, user: UserId) -> AppResult<()> {
        if self.registry.is_connected(user) {
            return Ok(());
        }
        let record = match self.store.mark_offline(user).await {
            Ok(record) => record,
            Err(e) => {
                warn!(user_id = %user, error = %e, "Failed to mark user offline");
                PresenceUpdate::offline(user)
            }
        };

        let event = OutboundEvent::PresenceUpdate(record);
        let peers = self.counterparts_of(user).await;
        let notified = self.delivery.to_users(peers, &event);
        debug!(user_id = %user, notified, "Offline presence announced");
        Ok(())
    }

    /// Heartbeat refresh of the online record.
    pub async fn refresh(&self, user: UserId) -> AppResult<()> {
        self.store.refresh(user).await
    }

    /// Online snapshot of `peer`, if they are online here or elsewhere.
    async fn online_status(&self, peer: UserId) -> Option<PresenceUpdate> {
        if self.registry.is_connected(peer) {
            return Some(PresenceUpdate::online(peer));
        }
        match self.store.is_online(peer).await {
            Ok(true) => Some(PresenceUpdate::online(peer)),
            Ok(false) => None,
            Err(e) => {
                debug!(user_id = %peer, error = %e, "Presence lookup failed");
                None
            }
        }
    }

    /// Direct relations plus active transactional counterparts.
    async fn counterparts_of(&self, user: UserId) -> HashSet<UserId> {
        let (relations, counterparts) = tokio::join!(
            bounded(self.timeout, self.relations.relations(user)),
            bounded(self.timeout, self.counterparts.active_counterparts(user)),
        );

        let mut peers = relations.unwrap_or_else(|e| {
            warn!(user_id = %user, error = %e, "Relationship lookup failed");
            HashSet::new()
        });
        match counterparts {
            Ok(extra) => peers.extend(extra),
            Err(e) => warn!(user_id = %user, error = %e, "Counterpart lookup failed"),
        }
        peers.remove(&user);
        peers
    }
}
