//! Lookups the hub delegates to the rest of the platform.
//!
//! Every call may be slow or fail; callers bound them with a deadline and
//! degrade rather than block routing.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::events::{ConversationRef, Visibility};
use crate::result::AppResult;
use crate::types::id::{ContentId, GroupId, MessageId, UserId};

/// Social graph: who a user is related to (friends, followers, ...).
#[async_trait]
pub trait RelationshipLookup: Send + Sync + 'static {
    /// Users related to `user`. Never includes `user` itself.
    async fn relations(&self, user: UserId) -> AppResult<HashSet<UserId>>;
}

/// Group membership directory.
#[async_trait]
pub trait GroupDirectory: Send + Sync + 'static {
    /// Current members of `group`.
    async fn members(&self, group: GroupId) -> AppResult<HashSet<UserId>>;

    /// Groups `user` currently belongs to.
    async fn groups_of(&self, user: UserId) -> AppResult<HashSet<GroupId>>;
}

/// Minimal view of a persisted chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    /// Message ID.
    pub id: MessageId,
    /// Author.
    pub sender_id: UserId,
    /// Direct recipient.
    pub receiver_id: Option<UserId>,
    /// Group conversation.
    pub group_id: Option<GroupId>,
    /// Stored body.
    pub content: String,
    /// Content type.
    pub content_type: String,
    /// Creation time.
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Persistent chat store.
#[async_trait]
pub trait MessageRepository: Send + Sync + 'static {
    /// Load a message by ID.
    async fn find_by_id(&self, id: MessageId) -> AppResult<Option<StoredMessage>>;

    /// Record that `recipient` received `ids` in `conversation`.
    async fn mark_delivered(
        &self,
        recipient: UserId,
        conversation: ConversationRef,
        ids: &[MessageId],
    ) -> AppResult<()>;
}

/// Ownership and visibility of a feed item.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentSummary {
    /// The item.
    pub id: ContentId,
    /// Author.
    pub owner_id: UserId,
    /// Visibility label of the item itself.
    pub visibility: Visibility,
    /// Root post for comments and replies, `None` for posts.
    pub post_id: Option<ContentId>,
}

/// Feed store: posts, comments and replies.
#[async_trait]
pub trait ContentRepository: Send + Sync + 'static {
    /// Look up a post, comment or reply.
    async fn find_content(&self, id: ContentId) -> AppResult<Option<ContentSummary>>;
}

/// Marketplace counterparts: users with an active conversation about a
/// listing with `user`.
#[async_trait]
pub trait CounterpartLookup: Send + Sync + 'static {
    /// Active counterparts of `user`.
    async fn active_counterparts(&self, user: UserId) -> AppResult<HashSet<UserId>>;
}
