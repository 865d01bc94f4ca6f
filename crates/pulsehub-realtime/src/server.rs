//! Top-level hub that wires every subsystem together and owns the shared
//! cancellation scope.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use pulsehub_cache::CacheManager;
use pulsehub_core::config::RealtimeConfig;
use pulsehub_core::events::{ChatMessage, InboundEvent, OutboundEvent};
use pulsehub_core::result::AppResult;
use pulsehub_core::traits::{
    ContentRepository, CounterpartLookup, GroupDirectory, MessageRepository, RelationshipLookup,
};
use pulsehub_core::types::id::UserId;

use crate::background::{BackgroundPool, bounded};
use crate::bridge::{BridgePublisher, BridgeSubscriber};
use crate::connection::registry::Registry;
use crate::connection::session::{Session, SessionState};
use crate::context::HubContext;
use crate::delivery::DeliveryEngine;
use crate::fanout::PrivacyClassifier;
use crate::metrics::HubMetrics;
use crate::pending::{MessageCache, PendingDrainer, PendingQueue};
use crate::presence::{PresenceStore, PresenceTracker};
use crate::reaper::Reaper;
use crate::router;
use crate::router::ingress::{CloseReason, Ingress, mailboxes};

/// External collaborators the hub consults.
#[derive(Clone)]
pub struct Collaborators {
    pub relations: Arc<dyn RelationshipLookup>,
    pub groups: Arc<dyn GroupDirectory>,
    pub messages: Arc<dyn MessageRepository>,
    pub content: Arc<dyn ContentRepository>,
    pub counterparts: Arc<dyn CounterpartLookup>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish()
    }
}

/// Upper bound on waiting for the router, reaper and bridge to stop.
const TASK_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// The real-time delivery hub. One per process.
pub struct Hub {
    ctx: Arc<HubContext>,
    publisher: BridgePublisher,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("instance_id", &self.publisher.origin())
            .finish()
    }
}

impl Hub {
    /// Builds every subsystem and spawns the router, the reaper and (if
    /// enabled) the bridge subscriber under one cancellation token.
    pub fn start(
        config: RealtimeConfig,
        store: Arc<CacheManager>,
        collaborators: Collaborators,
    ) -> Arc<Self> {
        let instance_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let timeout = config.collaborator_timeout();

        let metrics = Arc::new(HubMetrics::new());
        let registry = Arc::new(Registry::new(Arc::clone(&metrics)));
        let (ingress, mb) = mailboxes(config.inbound_buffer_size, Arc::clone(&metrics));
        let background = Arc::new(BackgroundPool::new(
            config.background_concurrency,
            timeout,
            Arc::clone(&metrics),
        ));

        let pending = Arc::new(PendingQueue::new(
            Arc::clone(&store),
            &config.pending,
            Arc::clone(&metrics),
        ));
        let contents = Arc::new(MessageCache::new(
            Arc::clone(&store),
            Arc::clone(&collaborators.messages),
            Duration::from_secs(config.pending.message_ttl_seconds),
            timeout,
        ));

        let presence_store = PresenceStore::new(
            Arc::clone(&store),
            Duration::from_secs(config.presence_ttl_seconds),
            Duration::from_secs(config.offline_presence_ttl_seconds),
        );

        let delivery = DeliveryEngine::new(
            Arc::clone(&registry),
            Arc::clone(&pending),
            Arc::clone(&contents),
            presence_store.clone(),
            Arc::clone(&collaborators.groups),
            Arc::clone(&collaborators.messages),
            Arc::clone(&background),
            ingress.clone(),
            Arc::clone(&metrics),
            timeout,
        );
        let drainer = Arc::new(PendingDrainer::new(
            Arc::clone(&pending),
            contents,
            Arc::clone(&collaborators.groups),
            delivery.clone(),
            Arc::clone(&metrics),
            timeout,
        ));
        let presence = Arc::new(PresenceTracker::new(
            presence_store,
            Arc::clone(&registry),
            delivery.clone(),
            Arc::clone(&collaborators.relations),
            Arc::clone(&collaborators.counterparts),
            timeout,
        ));
        let classifier = Arc::new(PrivacyClassifier::new(
            Arc::clone(&collaborators.relations),
            Arc::clone(&collaborators.content),
            timeout,
        ));

        let reaper = Reaper::new(
            Arc::clone(&registry),
            ingress.clone(),
            Arc::clone(&metrics),
            Duration::from_secs(config.reaper_interval_seconds),
            config.stale_after(),
        );
        let subscriber = config.bridge.enabled.then(|| {
            BridgeSubscriber::new(
                Arc::clone(&store),
                &config.bridge,
                instance_id,
                ingress.clone(),
                Arc::clone(&metrics),
            )
        });
        let publisher = BridgePublisher::new(store, config.bridge.channel.clone(), instance_id);

        let ctx = Arc::new(HubContext {
            config,
            registry,
            metrics,
            pending,
            drainer,
            presence,
            delivery,
            classifier,
            background,
            collaborators,
            ingress,
        });

        let mut tasks = vec![
            tokio::spawn(router::run(Arc::clone(&ctx), mb, cancel.child_token())),
            tokio::spawn(reaper.run(cancel.child_token())),
        ];
        if let Some(subscriber) = subscriber {
            tasks.push(tokio::spawn(subscriber.run(cancel.child_token())));
        }

        info!(%instance_id, bridge = ctx.config.bridge.enabled, "Real-time hub started");

        Arc::new(Self {
            ctx,
            publisher,
            cancel,
            tasks: Mutex::new(tasks),
        })
    }

    /// Opens a Session for an authenticated user and queues its registration.
    ///
    /// Returns the Session with the receiving end of its outbound mailbox;
    /// the caller's write loop owns that receiver.
    pub async fn connect(&self, user: UserId) -> AppResult<(Arc<Session>, mpsc::Receiver<OutboundEvent>)> {
        let lookup = self.ctx.collaborators.groups.groups_of(user);
        let groups = bounded(self.ctx.config.collaborator_timeout(), lookup)
            .await
            .unwrap_or_else(|e| {
                warn!(user_id = %user, error = %e, "Group lookup failed, connecting without groups");
                HashSet::new()
            });

        let (session, outbound) =
            Session::new(user, groups, self.ctx.config.outbound_buffer_size);
        self.ctx.ingress.register(Arc::clone(&session))?;
        Ok((session, outbound))
    }

    /// Ends a Session whose connection went away.
    pub fn disconnect(&self, session: &Session) {
        session.advance(SessionState::Closing);
        self.ctx
            .ingress
            .unregister(session.id, CloseReason::Disconnected);
    }

    /// Offers an event from a producer (durable-log consumer, in-process
    /// service) to the router. Returns `false` if it was dropped.
    pub fn submit(&self, event: InboundEvent) -> bool {
        self.ctx.ingress.submit(event)
    }

    /// Delivers a message through this instance and republishes it for
    /// every other instance.
    pub async fn broadcast_message(&self, message: ChatMessage) -> AppResult<()> {
        self.ctx.ingress.submit_message(message.clone());
        self.publisher.publish(&message).await
    }

    pub fn ingress(&self) -> &Ingress {
        &self.ctx.ingress
    }

    pub fn publisher(&self) -> &BridgePublisher {
        &self.publisher
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.ctx.registry
    }

    pub fn pending(&self) -> &Arc<PendingQueue> {
        &self.ctx.pending
    }

    pub fn presence(&self) -> &PresenceStore {
        self.ctx.presence.store()
    }

    pub fn metrics(&self) -> &Arc<HubMetrics> {
        &self.ctx.metrics
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.ctx.config
    }

    /// Stops the router, the reaper and the bridge, then closes every live
    /// Session through the ordinary removal path.
    pub async fn shutdown(&self) {
        info!("Shutting down real-time hub");
        self.cancel.cancel();

        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            if tokio::time::timeout(TASK_STOP_TIMEOUT, task).await.is_err() {
                warn!("Hub task did not stop in time");
            }
        }

        let sessions = self.ctx.registry.all();
        let closed = sessions.len();
        for session in sessions {
            self.ctx.remove_session(session.id, CloseReason::Shutdown);
        }
        info!(closed, "Real-time hub shut down");
    }
}
