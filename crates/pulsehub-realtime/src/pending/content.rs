//! Message body cache consulted when draining pending entries.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use pulsehub_cache::{CacheManager, keys};
use pulsehub_core::events::ChatMessage;
use pulsehub_core::result::AppResult;
use pulsehub_core::traits::{CacheProvider, MessageRepository, StoredMessage};
use pulsehub_core::types::id::MessageId;

use crate::background::bounded;

/// Bodies of queued messages, with the message repository as fallback.
pub struct MessageCache {
    store: Arc<CacheManager>,
    messages: Arc<dyn MessageRepository>,
    ttl: Duration,
    timeout: Duration,
}

impl std::fmt::Debug for MessageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageCache")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl MessageCache {
    /// Creates a cache with body expiry `ttl`; repository lookups are
    /// bounded by `timeout`.
    pub fn new(
        store: Arc<CacheManager>,
        messages: Arc<dyn MessageRepository>,
        ttl: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            messages,
            ttl,
            timeout,
        }
    }

    /// Stores a body for later drains.
    pub async fn store(&self, message: &ChatMessage) -> AppResult<()> {
        self.store
            .set_json(&keys::message(message.id), message, self.ttl)
            .await
    }

    /// Loads a body, falling back to the repository on a cache miss.
    pub async fn load(&self, id: MessageId) -> AppResult<Option<ChatMessage>> {
        match self.store.get_json::<ChatMessage>(&keys::message(id)).await {
            Ok(Some(message)) => return Ok(Some(message)),
            Ok(None) => debug!(message_id = %id, "Message body not cached"),
            Err(e) => warn!(message_id = %id, error = %e, "Message cache read failed"),
        }

        let stored = bounded(self.timeout, self.messages.find_by_id(id)).await?;
        Ok(stored.map(from_stored))
    }
}

/// Rebuilds the wire form of a persisted message.
pub(crate) fn from_stored(stored: StoredMessage) -> ChatMessage {
    ChatMessage {
        id: stored.id,
        sender_id: stored.sender_id,
        receiver_id: stored.receiver_id,
        group_id: stored.group_id,
        content: stored.content,
        content_type: stored.content_type,
        created_at: stored.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pulsehub_core::config::CacheConfig;
    use pulsehub_core::types::id::UserId;

    use crate::testing::InMemoryDirectory;

    fn message() -> ChatMessage {
        ChatMessage {
            id: MessageId::new(),
            sender_id: UserId::new(),
            receiver_id: Some(UserId::new()),
            group_id: None,
            content: "hi".to_string(),
            content_type: "text".to_string(),
            created_at: Utc::now(),
        }
    }

    fn cache(directory: Arc<InMemoryDirectory>) -> MessageCache {
        MessageCache::new(
            Arc::new(CacheManager::in_memory(&CacheConfig::default())),
            directory,
            Duration::from_secs(60),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_stored_body_is_loaded() {
        let cache = cache(Arc::new(InMemoryDirectory::new()));
        let msg = message();
        cache.store(&msg).await.unwrap();
        assert_eq!(cache.load(msg.id).await.unwrap(), Some(msg));
    }

    #[tokio::test]
    async fn test_miss_falls_back_to_repository() {
        let directory = Arc::new(InMemoryDirectory::new());
        let msg = message();
        directory.insert_message(&msg);
        let cache = cache(Arc::clone(&directory));

        let loaded = cache.load(msg.id).await.unwrap().unwrap();
        assert_eq!(loaded.content, "hi");
        assert!(cache.load(MessageId::new()).await.unwrap().is_none());
    }
}
