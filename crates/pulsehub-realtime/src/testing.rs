//! In-memory collaborators for tests and local runs without a database.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use pulsehub_core::events::{ChatMessage, ConversationRef};
use pulsehub_core::result::AppResult;
use pulsehub_core::traits::{
    ContentRepository, ContentSummary, CounterpartLookup, GroupDirectory, MessageRepository,
    RelationshipLookup, StoredMessage,
};
use pulsehub_core::types::id::{ContentId, GroupId, MessageId, UserId};

use crate::server::Collaborators;

/// One recorded `mark_delivered` call.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryMark {
    pub recipient: UserId,
    pub conversation: ConversationRef,
    pub ids: Vec<MessageId>,
}

#[derive(Debug, Default)]
struct Tables {
    relations: HashMap<UserId, HashSet<UserId>>,
    counterparts: HashMap<UserId, HashSet<UserId>>,
    members: HashMap<GroupId, HashSet<UserId>>,
    messages: HashMap<MessageId, StoredMessage>,
    content: HashMap<ContentId, ContentSummary>,
    marks: Vec<DeliveryMark>,
}

/// Implements every collaborator trait over plain maps.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    tables: RwLock<Tables>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `a` and `b` direct relations of each other.
    pub fn relate(&self, a: UserId, b: UserId) {
        let mut t = self.write();
        t.relations.entry(a).or_default().insert(b);
        t.relations.entry(b).or_default().insert(a);
    }

    /// Makes `a` and `b` active counterparts of each other.
    pub fn pair_counterparts(&self, a: UserId, b: UserId) {
        let mut t = self.write();
        t.counterparts.entry(a).or_default().insert(b);
        t.counterparts.entry(b).or_default().insert(a);
    }

    pub fn add_member(&self, group: GroupId, user: UserId) {
        self.write().members.entry(group).or_default().insert(user);
    }

    pub fn remove_member(&self, group: GroupId, user: UserId) {
        if let Some(members) = self.write().members.get_mut(&group) {
            members.remove(&user);
        }
    }

    pub fn insert_message(&self, message: &ChatMessage) {
        self.write().messages.insert(
            message.id,
            StoredMessage {
                id: message.id,
                sender_id: message.sender_id,
                receiver_id: message.receiver_id,
                group_id: message.group_id,
                content: message.content.clone(),
                content_type: message.content_type.clone(),
                created_at: message.created_at,
            },
        );
    }

    pub fn insert_content(&self, content: ContentSummary) {
        self.write().content.insert(content.id, content);
    }

    /// Every `mark_delivered` call so far.
    pub fn delivery_marks(&self) -> Vec<DeliveryMark> {
        self.read().marks.clone()
    }

    /// Wraps this directory as the full collaborator set.
    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators {
            relations: Arc::clone(self) as Arc<dyn RelationshipLookup>,
            groups: Arc::clone(self) as Arc<dyn GroupDirectory>,
            messages: Arc::clone(self) as Arc<dyn MessageRepository>,
            content: Arc::clone(self) as Arc<dyn ContentRepository>,
            counterparts: Arc::clone(self) as Arc<dyn CounterpartLookup>,
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RelationshipLookup for InMemoryDirectory {
    async fn relations(&self, user: UserId) -> AppResult<HashSet<UserId>> {
        Ok(self.read().relations.get(&user).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl CounterpartLookup for InMemoryDirectory {
    async fn active_counterparts(&self, user: UserId) -> AppResult<HashSet<UserId>> {
        Ok(self.read().counterparts.get(&user).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl GroupDirectory for InMemoryDirectory {
    async fn members(&self, group: GroupId) -> AppResult<HashSet<UserId>> {
        Ok(self.read().members.get(&group).cloned().unwrap_or_default())
    }

    async fn groups_of(&self, user: UserId) -> AppResult<HashSet<GroupId>> {
        Ok(self
            .read()
            .members
            .iter()
            .filter(|(_, members)| members.contains(&user))
            .map(|(group, _)| *group)
            .collect())
    }
}

#[async_trait]
impl MessageRepository for InMemoryDirectory {
    async fn find_by_id(&self, id: MessageId) -> AppResult<Option<StoredMessage>> {
        Ok(self.read().messages.get(&id).cloned())
    }

    async fn mark_delivered(
        &self,
        recipient: UserId,
        conversation: ConversationRef,
        ids: &[MessageId],
    ) -> AppResult<()> {
        self.write().marks.push(DeliveryMark {
            recipient,
            conversation,
            ids: ids.to_vec(),
        });
        Ok(())
    }
}

#[async_trait]
impl ContentRepository for InMemoryDirectory {
    async fn find_content(&self, id: ContentId) -> AppResult<Option<ContentSummary>> {
        Ok(self.read().content.get(&id).cloned())
    }
}
