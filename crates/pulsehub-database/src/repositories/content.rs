//! Feed content lookups (posts, comments, replies).

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use pulsehub_core::error::{AppError, ErrorKind};
use pulsehub_core::events::Visibility;
use pulsehub_core::result::AppResult;
use pulsehub_core::traits::{ContentRepository, ContentSummary};
use pulsehub_core::types::id::{ContentId, UserId};

/// Resolves ownership and visibility of feed items.
///
/// Comments and replies carry the visibility of their root post.
#[derive(Debug, Clone)]
pub struct FeedContentRepository {
    pool: PgPool,
}

impl FeedContentRepository {
    /// Create a new feed content repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContentRepository for FeedContentRepository {
    async fn find_content(&self, id: ContentId) -> AppResult<Option<ContentSummary>> {
        let row = sqlx::query_as::<_, (Uuid, Uuid, String, Option<Uuid>)>(
            "SELECT id, user_id, visibility, NULL::uuid FROM posts \
             WHERE id = $1 AND deleted_at IS NULL \
             UNION ALL \
             SELECT c.id, c.user_id, p.visibility, c.post_id FROM comments c \
             JOIN posts p ON p.id = c.post_id \
             WHERE c.id = $1 AND c.deleted_at IS NULL \
             LIMIT 1",
        )
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to load content", e))?;

        Ok(row.map(|(id, owner, visibility, post)| ContentSummary {
            id: ContentId::from_uuid(id),
            owner_id: UserId::from_uuid(owner),
            visibility: Visibility::from(visibility),
            post_id: post.map(ContentId::from_uuid),
        }))
    }
}
