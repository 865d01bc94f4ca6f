//! Social graph lookups.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use pulsehub_core::error::{AppError, ErrorKind};
use pulsehub_core::result::AppResult;
use pulsehub_core::traits::RelationshipLookup;
use pulsehub_core::types::id::UserId;

/// Reads accepted relationships (friends and follows) in either direction.
#[derive(Debug, Clone)]
pub struct RelationshipRepository {
    pool: PgPool,
}

impl RelationshipRepository {
    /// Create a new relationship repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RelationshipLookup for RelationshipRepository {
    async fn relations(&self, user: UserId) -> AppResult<HashSet<UserId>> {
        let rows: Vec<Uuid> = sqlx::query_scalar(
            "SELECT CASE WHEN user_id = $1 THEN related_user_id ELSE user_id END \
             FROM relationships \
             WHERE (user_id = $1 OR related_user_id = $1) AND status = 'accepted'",
        )
        .bind(user.into_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to load relations", e))?;

        Ok(rows
            .into_iter()
            .map(UserId::from_uuid)
            .filter(|id| *id != user)
            .collect())
    }
}
