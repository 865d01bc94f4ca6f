//! Visibility-based audience classification.
//!
//! | Visibility | Audience |
//! |---|---|
//! | public | every live Session |
//! | only-me | owner |
//! | friends | owner and their direct relations |
//! | anything else | owner |
//!
//! Comments and replies also reach the owner of the item they hang off,
//! and otherwise follow the visibility of their root post.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use pulsehub_core::events::{FeedEvent, FeedPayload, NotificationCreated, Visibility};
use pulsehub_core::result::AppResult;
use pulsehub_core::traits::{ContentRepository, ContentSummary, RelationshipLookup};
use pulsehub_core::types::id::{ContentId, UserId};

use crate::background::bounded;

/// Who receives a feed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Every live Session.
    Everyone,
    /// The live Sessions of these users.
    Users(HashSet<UserId>),
}

impl Audience {
    fn only(user: UserId) -> Self {
        Self::Users(HashSet::from([user]))
    }

    fn including(self, extra: impl IntoIterator<Item = UserId>) -> Self {
        match self {
            Self::Everyone => Self::Everyone,
            Self::Users(mut users) => {
                users.extend(extra);
                Self::Users(users)
            }
        }
    }

    /// Whether `user` is part of this audience.
    pub fn contains(&self, user: UserId) -> bool {
        match self {
            Self::Everyone => true,
            Self::Users(users) => users.contains(&user),
        }
    }
}

/// Audience of a feed event plus any notification it raises.
#[derive(Debug, Clone, PartialEq)]
pub struct FanoutPlan {
    pub audience: Audience,
    pub notification: Option<NotificationCreated>,
}

/// Resolves feed-event audiences from visibility, relations and content
/// ownership.
pub struct PrivacyClassifier {
    relations: Arc<dyn RelationshipLookup>,
    content: Arc<dyn ContentRepository>,
    timeout: Duration,
}

impl std::fmt::Debug for PrivacyClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivacyClassifier").finish()
    }
}

impl PrivacyClassifier {
    pub fn new(
        relations: Arc<dyn RelationshipLookup>,
        content: Arc<dyn ContentRepository>,
        timeout: Duration,
    ) -> Self {
        Self {
            relations,
            content,
            timeout,
        }
    }

    /// Plans the fan-out of one feed event.
    pub async fn classify(&self, event: &FeedEvent) -> AppResult<FanoutPlan> {
        let payload = event.routing()?;
        let ancestor_id = payload.parent_id.or(payload.post_id);

        match ancestor_id {
            Some(ancestor_id) if event.event_type.is_nested() => {
                self.classify_nested(event, &payload, ancestor_id).await
            }
            _ => {
                let visibility = match payload.visibility.clone() {
                    Some(v) => v,
                    None => match payload.content_id {
                        Some(id) => self
                            .lookup(id)
                            .await
                            .map(|c| c.visibility)
                            .unwrap_or_else(unknown),
                        None => unknown(),
                    },
                };
                Ok(FanoutPlan {
                    audience: self.by_visibility(&visibility, payload.owner_id).await,
                    notification: None,
                })
            }
        }
    }

    async fn classify_nested(
        &self,
        event: &FeedEvent,
        payload: &FeedPayload,
        ancestor_id: ContentId,
    ) -> AppResult<FanoutPlan> {
        let actor = payload.owner_id;
        let ancestor = self.lookup(ancestor_id).await;

        let root_id = payload
            .post_id
            .or_else(|| ancestor.as_ref().and_then(|a| a.post_id))
            .unwrap_or(ancestor_id);
        let root = if root_id == ancestor_id {
            ancestor.clone()
        } else {
            self.lookup(root_id).await
        };

        let (visibility, root_owner) = match &root {
            Some(root) => (root.visibility.clone(), root.owner_id),
            None => (payload.visibility.clone().unwrap_or_else(unknown), actor),
        };
        let ancestor_owner = ancestor.as_ref().map(|a| a.owner_id);

        let audience = self
            .by_visibility(&visibility, root_owner)
            .await
            .including(ancestor_owner.into_iter().chain([actor]));

        let notification = match ancestor_owner {
            Some(owner) if event.event_type.is_nested_creation() && owner != actor => {
                Some(NotificationCreated {
                    recipient_id: owner,
                    actor_id: actor,
                    kind: event.event_type,
                    content_id: Some(ancestor_id),
                    created_at: Utc::now(),
                })
            }
            _ => None,
        };

        Ok(FanoutPlan {
            audience,
            notification,
        })
    }

    /// Audience for content owned by `owner` with the given visibility.
    pub async fn by_visibility(&self, visibility: &Visibility, owner: UserId) -> Audience {
        match visibility {
            Visibility::Public => Audience::Everyone,
            Visibility::OnlyMe | Visibility::Other(_) => Audience::only(owner),
            Visibility::Friends => {
                match bounded(self.timeout, self.relations.relations(owner)).await {
                    Ok(relations) => Audience::only(owner).including(relations),
                    Err(e) => {
                        warn!(user_id = %owner, error = %e, "Relationship lookup failed, owner only");
                        Audience::only(owner)
                    }
                }
            }
        }
    }

    async fn lookup(&self, id: ContentId) -> Option<ContentSummary> {
        match bounded(self.timeout, self.content.find_content(id)).await {
            Ok(found) => found,
            Err(e) => {
                debug!(content_id = %id, error = %e, "Content lookup failed");
                None
            }
        }
    }
}

fn unknown() -> Visibility {
    Visibility::Other(String::new())
}
