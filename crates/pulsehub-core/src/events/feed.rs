//! Social feed events and the visibility vocabulary used to scope them.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::result::AppResult;
use crate::types::id::{ContentId, UserId};

/// Kind of feed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedEventType {
    PostCreated,
    PostUpdated,
    PostDeleted,
    CommentCreated,
    CommentUpdated,
    CommentDeleted,
    ReplyCreated,
    ReplyUpdated,
    ReplyDeleted,
    ReactionChanged,
    GroupChanged,
}

impl FeedEventType {
    /// Converts to the wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PostCreated => "post_created",
            Self::PostUpdated => "post_updated",
            Self::PostDeleted => "post_deleted",
            Self::CommentCreated => "comment_created",
            Self::CommentUpdated => "comment_updated",
            Self::CommentDeleted => "comment_deleted",
            Self::ReplyCreated => "reply_created",
            Self::ReplyUpdated => "reply_updated",
            Self::ReplyDeleted => "reply_deleted",
            Self::ReactionChanged => "reaction_changed",
            Self::GroupChanged => "group_changed",
        }
    }

    /// True for events that live under a parent (comments and replies).
    pub fn is_nested(&self) -> bool {
        matches!(
            self,
            Self::CommentCreated
                | Self::CommentUpdated
                | Self::CommentDeleted
                | Self::ReplyCreated
                | Self::ReplyUpdated
                | Self::ReplyDeleted
        )
    }

    /// True when a new comment or reply was posted.
    pub fn is_nested_creation(&self) -> bool {
        matches!(self, Self::CommentCreated | Self::ReplyCreated)
    }
}

/// Visibility label of a piece of content.
///
/// Unrecognized labels parse to [`Visibility::Other`] and are treated as
/// owner-only by the fan-out classifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Visibility {
    /// Everyone connected.
    Public,
    /// Owner only.
    OnlyMe,
    /// Owner and their relations.
    Friends,
    /// Any label we do not know.
    Other(String),
}

impl From<String> for Visibility {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "public" | "everyone" => Self::Public,
            "only_me" | "onlyme" | "private" => Self::OnlyMe,
            "friends" | "relations" | "friends_only" => Self::Friends,
            _ => Self::Other(raw),
        }
    }
}

impl From<Visibility> for String {
    fn from(v: Visibility) -> Self {
        match v {
            Visibility::Public => "public".to_string(),
            Visibility::OnlyMe => "only_me".to_string(),
            Visibility::Friends => "friends".to_string(),
            Visibility::Other(raw) => raw,
        }
    }
}

/// A feed change broadcast to the audience its visibility allows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEvent {
    /// What changed.
    #[serde(rename = "type")]
    pub event_type: FeedEventType,
    /// Free-form body forwarded verbatim to receivers.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// The routing fields pulled out of a [`FeedEvent`] payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedPayload {
    /// Author of the changed item.
    #[serde(alias = "user_id", alias = "author_id")]
    pub owner_id: UserId,
    /// Visibility stated on the event, if any.
    #[serde(default)]
    pub visibility: Option<Visibility>,
    /// ID of the changed item.
    #[serde(default, alias = "id")]
    pub content_id: Option<ContentId>,
    /// Root post for comments and replies.
    #[serde(default)]
    pub post_id: Option<ContentId>,
    /// Immediate parent (post for comments, comment for replies).
    #[serde(default)]
    pub parent_id: Option<ContentId>,
}

impl FeedEvent {
    /// Extracts the routing fields from the payload.
    pub fn routing(&self) -> AppResult<FeedPayload> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            AppError::validation(format!(
                "Feed event {} has an unusable payload: {e}",
                self.event_type.as_str()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_parses_aliases_and_unknowns() {
        let parse = |s: &str| Visibility::from(s.to_string());
        assert_eq!(parse("public"), Visibility::Public);
        assert_eq!(parse("Only-Me"), Visibility::OnlyMe);
        assert_eq!(parse("friends"), Visibility::Friends);
        assert_eq!(parse("circle"), Visibility::Other("circle".into()));
    }

    #[test]
    fn test_routing_accepts_author_alias() {
        let owner = UserId::new();
        let post = ContentId::new();
        let event = FeedEvent {
            event_type: FeedEventType::CommentCreated,
            payload: serde_json::json!({
                "author_id": owner,
                "post_id": post,
                "parent_id": post,
                "text": "nice",
            }),
        };
        let routing = event.routing().expect("routing");
        assert_eq!(routing.owner_id, owner);
        assert_eq!(routing.post_id, Some(post));
        assert!(routing.visibility.is_none());
    }

    #[test]
    fn test_routing_without_owner_is_rejected() {
        let event = FeedEvent {
            event_type: FeedEventType::PostCreated,
            payload: serde_json::json!({ "visibility": "public" }),
        };
        assert!(event.routing().is_err());
    }
}
