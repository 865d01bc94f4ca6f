//! Key builders for every shared-store entry pulsehub writes.
//!
//! The Redis provider adds its configured prefix on top of these.

use pulsehub_core::types::id::{GroupId, MessageId, UserId};

// ── Presence ───────────────────────────────────────────────

/// Shared presence record of a user.
pub fn presence(user_id: UserId) -> String {
    format!("presence:{user_id}")
}

// ── Pending lists ──────────────────────────────────────────

/// Pending direct-message IDs for a user.
pub fn pending_user(user_id: UserId) -> String {
    format!("pending:user:{user_id}")
}

/// Pending group-message IDs for one member of a group.
pub fn pending_group_member(group_id: GroupId, member_id: UserId) -> String {
    format!("pending:group:{group_id}:{member_id}")
}

// ── Message bodies ─────────────────────────────────────────

/// Cached body of a queued message.
pub fn message(message_id: MessageId) -> String {
    format!("message:{message_id}")
}

// ── Auth ───────────────────────────────────────────────────

/// Revoked access token, keyed by `jti`.
pub fn jwt_blocklist(jti: &str) -> String {
    format!("jwt:blocked:{jti}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_member_key_names_both_ids() {
        let group = GroupId::new();
        let member = UserId::new();
        assert_eq!(
            pending_group_member(group, member),
            format!("pending:group:{group}:{member}")
        );
    }

    #[test]
    fn test_user_and_group_keys_do_not_collide() {
        let user = UserId::new();
        assert_ne!(pending_user(user), presence(user));
        assert!(pending_user(user).starts_with("pending:user:"));
    }
}
