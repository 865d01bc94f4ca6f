//! Marketplace counterpart lookups.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use pulsehub_core::error::{AppError, ErrorKind};
use pulsehub_core::result::AppResult;
use pulsehub_core::traits::CounterpartLookup;
use pulsehub_core::types::id::UserId;

/// Reads buyers and sellers a user is actively negotiating with.
#[derive(Debug, Clone)]
pub struct MarketplaceRepository {
    pool: PgPool,
}

impl MarketplaceRepository {
    /// Create a new marketplace repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CounterpartLookup for MarketplaceRepository {
    async fn active_counterparts(&self, user: UserId) -> AppResult<HashSet<UserId>> {
        let rows: Vec<Uuid> = sqlx::query_scalar(
            "SELECT DISTINCT CASE WHEN buyer_id = $1 THEN seller_id ELSE buyer_id END \
             FROM marketplace_conversations \
             WHERE (buyer_id = $1 OR seller_id = $1) AND status = 'active'",
        )
        .bind(user.into_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to load marketplace counterparts", e)
        })?;

        Ok(rows
            .into_iter()
            .map(UserId::from_uuid)
            .filter(|id| *id != user)
            .collect())
    }
}
