//! Chat message lookups and delivery acknowledgments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use pulsehub_core::error::{AppError, ErrorKind};
use pulsehub_core::events::ConversationRef;
use pulsehub_core::result::AppResult;
use pulsehub_core::traits::{MessageRepository, StoredMessage};
use pulsehub_core::types::id::{GroupId, MessageId, UserId};

type MessageRow = (
    Uuid,
    Uuid,
    Option<Uuid>,
    Option<Uuid>,
    String,
    String,
    DateTime<Utc>,
);

/// Reads persisted chat messages and stamps `delivered_at`.
#[derive(Debug, Clone)]
pub struct ChatMessageRepository {
    pool: PgPool,
}

impl ChatMessageRepository {
    /// Create a new chat message repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_stored(row: MessageRow) -> StoredMessage {
    let (id, sender, receiver, group, content, content_type, created_at) = row;
    StoredMessage {
        id: MessageId::from_uuid(id),
        sender_id: UserId::from_uuid(sender),
        receiver_id: receiver.map(UserId::from_uuid),
        group_id: group.map(GroupId::from_uuid),
        content,
        content_type,
        created_at,
    }
}

#[async_trait]
impl MessageRepository for ChatMessageRepository {
    async fn find_by_id(&self, id: MessageId) -> AppResult<Option<StoredMessage>> {
        let row = sqlx::query_as::<_, MessageRow>(
            "SELECT id, sender_id, receiver_id, group_id, content, content_type, created_at \
             FROM messages WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to load message", e))?;

        Ok(row.map(to_stored))
    }

    async fn mark_delivered(
        &self,
        recipient: UserId,
        conversation: ConversationRef,
        ids: &[MessageId],
    ) -> AppResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = ids.iter().map(|id| id.into_uuid()).collect();

        let result = match conversation {
            ConversationRef::Direct(peer) => sqlx::query(
                "UPDATE messages SET delivered_at = NOW() \
                 WHERE id = ANY($1) AND receiver_id = $2 AND sender_id = $3 \
                 AND delivered_at IS NULL",
            )
            .bind(&ids)
            .bind(recipient.into_uuid())
            .bind(peer.into_uuid())
            .execute(&self.pool)
            .await,
            ConversationRef::Group(group) => sqlx::query(
                "INSERT INTO message_deliveries (message_id, user_id, delivered_at) \
                 SELECT m.id, $2, NOW() FROM messages m \
                 WHERE m.id = ANY($1) AND m.group_id = $3 \
                 ON CONFLICT (message_id, user_id) DO NOTHING",
            )
            .bind(&ids)
            .bind(recipient.into_uuid())
            .bind(group.into_uuid())
            .execute(&self.pool)
            .await,
        }
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to mark delivered", e))?;

        debug!(
            recipient = %recipient,
            rows = result.rows_affected(),
            "Marked messages delivered"
        );
        Ok(())
    }
}
