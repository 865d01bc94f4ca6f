//! TTL-bounded presence records in the shared store.

use std::sync::Arc;
use std::time::Duration;

use pulsehub_cache::{CacheManager, keys};
use pulsehub_core::events::{PresenceStatus, PresenceUpdate};
use pulsehub_core::result::AppResult;
use pulsehub_core::traits::CacheProvider;
use pulsehub_core::types::id::UserId;

/// Reads and writes `presence:{user}` records.
///
/// An online record lives for `online_ttl` unless refreshed by a heartbeat.
/// An offline record keeps the last-seen time for `offline_ttl`.
#[derive(Debug, Clone)]
pub struct PresenceStore {
    store: Arc<CacheManager>,
    online_ttl: Duration,
    offline_ttl: Duration,
}

impl PresenceStore {
    pub fn new(store: Arc<CacheManager>, online_ttl: Duration, offline_ttl: Duration) -> Self {
        Self {
            store,
            online_ttl,
            offline_ttl,
        }
    }

    pub async fn mark_online(&self, user: UserId) -> AppResult<PresenceUpdate> {
        let record = PresenceUpdate::online(user);
        self.store
            .set_json(&keys::presence(user), &record, self.online_ttl)
            .await?;
        Ok(record)
    }

    pub async fn mark_offline(&self, user: UserId) -> AppResult<PresenceUpdate> {
        let record = PresenceUpdate::offline(user);
        self.store
            .set_json(&keys::presence(user), &record, self.offline_ttl)
            .await?;
        Ok(record)
    }

    /// Extends an online record, recreating it if it lapsed or says offline.
    pub async fn refresh(&self, user: UserId) -> AppResult<()> {
        match self.get(user).await? {
            Some(record) if record.status == PresenceStatus::Online => {
                if !self.store.expire(&keys::presence(user), self.online_ttl).await? {
                    self.mark_online(user).await?;
                }
            }
            _ => {
                self.mark_online(user).await?;
            }
        }
        Ok(())
    }

    pub async fn get(&self, user: UserId) -> AppResult<Option<PresenceUpdate>> {
        self.store.get_json(&keys::presence(user)).await
    }

    pub async fn is_online(&self, user: UserId) -> AppResult<bool> {
        Ok(matches!(
            self.get(user).await?,
            Some(PresenceUpdate {
                status: PresenceStatus::Online,
                ..
            })
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsehub_core::config::CacheConfig;

    fn store(online_ttl: Duration) -> PresenceStore {
        PresenceStore::new(
            Arc::new(CacheManager::in_memory(&CacheConfig::default())),
            online_ttl,
            Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn test_online_then_offline() {
        let presence = store(Duration::from_secs(60));
        let user = UserId::new();
        assert!(!presence.is_online(user).await.unwrap());

        presence.mark_online(user).await.unwrap();
        assert!(presence.is_online(user).await.unwrap());

        let record = presence.mark_offline(user).await.unwrap();
        assert_eq!(record.status, PresenceStatus::Offline);
        assert!(!presence.is_online(user).await.unwrap());
        assert!(presence.get(user).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_refresh_revives_offline_record() {
        let presence = store(Duration::from_secs(60));
        let user = UserId::new();
        presence.mark_offline(user).await.unwrap();
        presence.refresh(user).await.unwrap();
        assert!(presence.is_online(user).await.unwrap());
    }
}
