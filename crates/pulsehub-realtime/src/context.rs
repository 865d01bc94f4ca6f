//! Shared state handed to the router and its handlers.

use std::sync::Arc;

use tracing::info;

use pulsehub_core::config::RealtimeConfig;
use pulsehub_core::types::id::ConnectionId;

use crate::background::BackgroundPool;
use crate::connection::registry::Registry;
use crate::connection::session::Session;
use crate::delivery::DeliveryEngine;
use crate::fanout::PrivacyClassifier;
use crate::metrics::HubMetrics;
use crate::pending::{PendingDrainer, PendingQueue};
use crate::presence::PresenceTracker;
use crate::router::ingress::{CloseReason, Ingress};
use crate::server::Collaborators;

/// Everything a handler may touch.
pub(crate) struct HubContext {
    pub config: RealtimeConfig,
    pub registry: Arc<Registry>,
    pub metrics: Arc<HubMetrics>,
    pub pending: Arc<PendingQueue>,
    pub drainer: Arc<PendingDrainer>,
    pub presence: Arc<PresenceTracker>,
    pub delivery: DeliveryEngine,
    pub classifier: Arc<PrivacyClassifier>,
    pub background: Arc<BackgroundPool>,
    pub collaborators: Collaborators,
    pub ingress: Ingress,
}

impl HubContext {
    /// The single removal path shared by disconnects, evictions, the
    /// reaper and shutdown.
    pub fn remove_session(self: &Arc<Self>, id: ConnectionId, reason: CloseReason) -> Option<Arc<Session>> {
        let session = self.registry.remove(id)?;
        let user = session.user_id;
        info!(conn_id = %id, user_id = %user, %reason, "Session closed");

        if !self.registry.is_connected(user) {
            let presence = Arc::clone(&self.presence);
            self.background
                .spawn("presence_unregister", async move { presence.on_unregister(user).await });
        }
        Some(session)
    }
}
