//! Connection registry: live Sessions indexed by user and by group.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use pulsehub_core::types::id::{ConnectionId, GroupId, UserId};

use crate::metrics::HubMetrics;

use super::session::{Session, SessionState};

type SessionSet = HashMap<ConnectionId, Arc<Session>>;

#[derive(Debug, Default)]
struct Maps {
    by_id: SessionSet,
    by_user: HashMap<UserId, SessionSet>,
    by_group: HashMap<GroupId, SessionSet>,
}

/// Concurrency-safe index of all live Sessions.
///
/// Every structural change happens under one write lock so a Session is
/// either in all of its sets or in none of them.
#[derive(Debug)]
pub struct Registry {
    maps: RwLock<Maps>,
    metrics: Arc<HubMetrics>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new(metrics: Arc<HubMetrics>) -> Self {
        Self {
            maps: RwLock::new(Maps::default()),
            metrics,
        }
    }

    /// Inserts a Session under its user and each of its groups.
    ///
    /// Returns `false` if the Session is already present or already closing.
    pub fn add(&self, session: Arc<Session>) -> bool {
        if session.is_closing() {
            return false;
        }
        {
            let mut maps = self.maps.write().unwrap_or_else(PoisonError::into_inner);
            if maps.by_id.contains_key(&session.id) {
                return false;
            }
            maps.by_id.insert(session.id, Arc::clone(&session));
            maps.by_user
                .entry(session.user_id)
                .or_default()
                .insert(session.id, Arc::clone(&session));
            for group in session.groups() {
                maps.by_group
                    .entry(*group)
                    .or_default()
                    .insert(session.id, Arc::clone(&session));
            }
        }
        session.advance(SessionState::Registered);
        self.metrics.connection_opened();
        debug!(conn_id = %session.id, user_id = %session.user_id, "Session registered");
        true
    }

    /// Removes a Session from every set and closes its outbound mailbox.
    ///
    /// Idempotent: removing an absent Session returns `None`.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Session>> {
        let session = {
            let mut maps = self.maps.write().unwrap_or_else(PoisonError::into_inner);
            let session = maps.by_id.remove(&id)?;
            if let Some(set) = maps.by_user.get_mut(&session.user_id) {
                set.remove(&id);
                if set.is_empty() {
                    maps.by_user.remove(&session.user_id);
                }
            }
            for group in session.groups() {
                if let Some(set) = maps.by_group.get_mut(group) {
                    set.remove(&id);
                    if set.is_empty() {
                        maps.by_group.remove(group);
                    }
                }
            }
            session
        };
        session.close();
        self.metrics.connection_closed();
        debug!(conn_id = %id, user_id = %session.user_id, "Session removed");
        Some(session)
    }

    /// Live Sessions of a user.
    pub fn by_user(&self, user: UserId) -> Vec<Arc<Session>> {
        let maps = self.maps.read().unwrap_or_else(PoisonError::into_inner);
        maps.by_user
            .get(&user)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Live Sessions subscribed to a group.
    pub fn by_group(&self, group: GroupId) -> Vec<Arc<Session>> {
        let maps = self.maps.read().unwrap_or_else(PoisonError::into_inner);
        maps.by_group
            .get(&group)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default()
    }

    /// A Session by connection ID.
    pub fn get(&self, id: ConnectionId) -> Option<Arc<Session>> {
        let maps = self.maps.read().unwrap_or_else(PoisonError::into_inner);
        maps.by_id.get(&id).cloned()
    }

    /// Every live Session.
    pub fn all(&self) -> Vec<Arc<Session>> {
        let maps = self.maps.read().unwrap_or_else(PoisonError::into_inner);
        maps.by_id.values().cloned().collect()
    }

    /// Whether the user has at least one live Session on this instance.
    pub fn is_connected(&self, user: UserId) -> bool {
        let maps = self.maps.read().unwrap_or_else(PoisonError::into_inner);
        maps.by_user.contains_key(&user)
    }

    /// Number of live Sessions.
    pub fn session_count(&self) -> usize {
        self.maps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .len()
    }

    /// Number of distinct connected users.
    pub fn user_count(&self) -> usize {
        self.maps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_user
            .len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn registry() -> (Registry, Arc<HubMetrics>) {
        let metrics = Arc::new(HubMetrics::new());
        (Registry::new(Arc::clone(&metrics)), metrics)
    }

    #[test]
    fn test_add_indexes_by_user_and_group() {
        let (registry, metrics) = registry();
        let user = UserId::new();
        let group = GroupId::new();
        let (s, _rx) = Session::new(user, HashSet::from([group]), 4);

        assert!(registry.add(Arc::clone(&s)));
        assert!(!registry.add(Arc::clone(&s)));
        assert_eq!(registry.by_user(user).len(), 1);
        assert_eq!(registry.by_group(group).len(), 1);
        assert_eq!(s.state(), SessionState::Registered);
        assert_eq!(metrics.snapshot().connections_active, 1);
    }

    #[tokio::test]
    async fn test_remove_clears_every_set_and_is_idempotent() {
        let (registry, metrics) = registry();
        let user = UserId::new();
        let g1 = GroupId::new();
        let g2 = GroupId::new();
        let (s, mut rx) = Session::new(user, HashSet::from([g1, g2]), 4);
        registry.add(Arc::clone(&s));

        assert!(registry.remove(s.id).is_some());
        assert!(registry.remove(s.id).is_none());

        assert!(registry.by_user(user).is_empty());
        assert!(registry.by_group(g1).is_empty());
        assert!(registry.by_group(g2).is_empty());
        assert!(!registry.is_connected(user));
        assert_eq!(s.state(), SessionState::Closed);
        assert!(rx.recv().await.is_none());
        assert_eq!(metrics.snapshot().connections_active, 0);
    }

    #[test]
    fn test_removing_one_device_keeps_the_other() {
        let (registry, _) = registry();
        let user = UserId::new();
        let (phone, _rx1) = Session::new(user, HashSet::new(), 4);
        let (laptop, _rx2) = Session::new(user, HashSet::new(), 4);
        registry.add(Arc::clone(&phone));
        registry.add(Arc::clone(&laptop));
        assert_eq!(registry.user_count(), 1);
        assert_eq!(registry.session_count(), 2);

        registry.remove(phone.id);
        let remaining = registry.by_user(user);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, laptop.id);
    }

    #[test]
    fn test_closed_session_is_not_registered() {
        let (registry, _) = registry();
        let (s, _rx) = Session::new(UserId::new(), HashSet::new(), 4);
        s.close();
        assert!(!registry.add(s));
        assert_eq!(registry.session_count(), 0);
    }
}
