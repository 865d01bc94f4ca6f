//! Group membership lookups.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use pulsehub_core::error::{AppError, ErrorKind};
use pulsehub_core::result::AppResult;
use pulsehub_core::traits::GroupDirectory;
use pulsehub_core::types::id::{GroupId, UserId};

/// Reads current group memberships.
#[derive(Debug, Clone)]
pub struct GroupRepository {
    pool: PgPool,
}

impl GroupRepository {
    /// Create a new group repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GroupDirectory for GroupRepository {
    async fn members(&self, group: GroupId) -> AppResult<HashSet<UserId>> {
        let rows: Vec<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM group_members WHERE group_id = $1 AND left_at IS NULL",
        )
        .bind(group.into_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to load group members", e))?;

        Ok(rows.into_iter().map(UserId::from_uuid).collect())
    }

    async fn groups_of(&self, user: UserId) -> AppResult<HashSet<GroupId>> {
        let rows: Vec<Uuid> = sqlx::query_scalar(
            "SELECT group_id FROM group_members WHERE user_id = $1 AND left_at IS NULL",
        )
        .bind(user.into_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to load user groups", e))?;

        Ok(rows.into_iter().map(GroupId::from_uuid).collect())
    }
}
