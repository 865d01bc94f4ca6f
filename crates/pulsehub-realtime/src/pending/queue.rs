//! Per-owner pending lists in the shared store.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use pulsehub_cache::{CacheManager, keys};
use pulsehub_core::config::PendingConfig;
use pulsehub_core::result::AppResult;
use pulsehub_core::traits::CacheProvider;
use pulsehub_core::types::id::{GroupId, MessageId, UserId};

use crate::metrics::HubMetrics;

/// Whose list a pending entry sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnerKey {
    /// Direct messages for a user.
    User(UserId),
    /// Group messages for one member of a group.
    GroupMember {
        /// The group the message was sent to
        group: GroupId,
        /// The member who missed it
        member: UserId,
    },
}

impl OwnerKey {
    /// Shared-store key of this owner's list.
    pub fn store_key(&self) -> String {
        match self {
            Self::User(user) => keys::pending_user(*user),
            Self::GroupMember { group, member } => keys::pending_group_member(*group, *member),
        }
    }
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(user) => write!(f, "user:{user}"),
            Self::GroupMember { group, member } => write!(f, "group:{group}:{member}"),
        }
    }
}

/// Bounded, expiring lists of message IDs keyed by owner.
///
/// Each list keeps the newest `max_per_owner` IDs in append order and
/// expires `ttl` after its last append. Any instance can read any list.
#[derive(Debug)]
pub struct PendingQueue {
    store: Arc<CacheManager>,
    max_per_owner: usize,
    ttl: Duration,
    metrics: Arc<HubMetrics>,
}

impl PendingQueue {
    /// Creates a queue over the shared store.
    pub fn new(store: Arc<CacheManager>, config: &PendingConfig, metrics: Arc<HubMetrics>) -> Self {
        Self {
            store,
            max_per_owner: config.max_per_owner.max(1),
            ttl: Duration::from_secs(config.ttl_seconds),
            metrics,
        }
    }

    /// Appends `id` to the owner's list.
    pub async fn enqueue(&self, owner: &OwnerKey, id: MessageId) -> AppResult<()> {
        let len = self
            .store
            .list_push(&owner.store_key(), &id.to_string(), self.max_per_owner, self.ttl)
            .await?;
        self.metrics.pending_enqueued();
        debug!(owner = %owner, message_id = %id, len, "Pending entry queued");
        Ok(())
    }

    /// The owner's IDs, oldest first.
    pub async fn list(&self, owner: &OwnerKey) -> AppResult<Vec<MessageId>> {
        let raw = self.store.list_range(&owner.store_key()).await?;
        Ok(raw
            .into_iter()
            .filter_map(|item| match item.parse() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(owner = %owner, entry = %item, "Skipping unparsable pending entry");
                    None
                }
            })
            .collect())
    }

    /// Drops every occurrence of `id` from the owner's list.
    pub async fn remove(&self, owner: &OwnerKey, id: MessageId) -> AppResult<()> {
        self.store
            .list_remove(&owner.store_key(), &id.to_string())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsehub_core::config::CacheConfig;

    fn queue(max_per_owner: usize) -> PendingQueue {
        let store = Arc::new(CacheManager::in_memory(&CacheConfig::default()));
        let config = PendingConfig {
            max_per_owner,
            ..PendingConfig::default()
        };
        PendingQueue::new(store, &config, Arc::new(HubMetrics::new()))
    }

    #[tokio::test]
    async fn test_list_preserves_append_order() {
        let q = queue(10);
        let owner = OwnerKey::User(UserId::new());
        let ids = [MessageId::new(), MessageId::new(), MessageId::new()];
        for id in ids {
            q.enqueue(&owner, id).await.unwrap();
        }
        assert_eq!(q.list(&owner).await.unwrap(), ids.to_vec());
    }

    #[tokio::test]
    async fn test_cap_keeps_newest() {
        let q = queue(2);
        let owner = OwnerKey::User(UserId::new());
        let ids = [MessageId::new(), MessageId::new(), MessageId::new()];
        for id in ids {
            q.enqueue(&owner, id).await.unwrap();
        }
        assert_eq!(q.list(&owner).await.unwrap(), vec![ids[1], ids[2]]);
    }

    #[tokio::test]
    async fn test_owners_are_isolated() {
        let q = queue(10);
        let member = UserId::new();
        let direct = OwnerKey::User(member);
        let grouped = OwnerKey::GroupMember {
            group: GroupId::new(),
            member,
        };
        let id = MessageId::new();
        q.enqueue(&grouped, id).await.unwrap();

        assert!(q.list(&direct).await.unwrap().is_empty());
        q.remove(&grouped, id).await.unwrap();
        assert!(q.list(&grouped).await.unwrap().is_empty());
    }
}
