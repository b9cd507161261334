//! Presence registry.
//!
//! Maps a user id to the set of live connections bound to it. A user is
//! online while that set is non-empty. Callers get the transition back from
//! every mutation and decide what to broadcast, so the registry itself never
//! touches a transport.

use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Result of binding a connection to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceChange {
    /// First connection for this user: announce `user online`.
    CameOnline,
    /// The user already had another live connection.
    AlreadyOnline,
}

/// Result of dropping a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceDrop {
    /// Last connection for this user: announce `user offline`.
    WentOffline { user_id: String },
    /// The user still has other live connections.
    StillOnline { user_id: String },
    /// The connection never completed setup.
    Unbound,
}

/// User id ⇄ connection id bookkeeping.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    users: BTreeMap<String, BTreeSet<String>>,
    owners: HashMap<String, String>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `conn_id` to `user_id`.
    ///
    /// Binding an already-bound connection to a different user releases the
    /// old binding first; the returned drop (if any) must be announced too.
    pub fn connection_opened(
        &mut self,
        user_id: &str,
        conn_id: &str,
    ) -> (PresenceChange, Option<PresenceDrop>) {
        let previous = self.owners.get(conn_id).cloned();
        let rebound = match previous {
            Some(owner) if owner != user_id => Some(self.connection_closed(conn_id)),
            _ => None,
        };

        let conns = self.users.entry(user_id.to_string()).or_default();
        let was_empty = conns.is_empty();
        conns.insert(conn_id.to_string());
        self.owners.insert(conn_id.to_string(), user_id.to_string());

        let change = if was_empty {
            tracing::info!(user_id = user_id, conn_id = conn_id, "User online");
            PresenceChange::CameOnline
        } else {
            PresenceChange::AlreadyOnline
        };
        (change, rebound)
    }

    /// Release whatever user `conn_id` was bound to.
    pub fn connection_closed(&mut self, conn_id: &str) -> PresenceDrop {
        let Some(user_id) = self.owners.remove(conn_id) else {
            return PresenceDrop::Unbound;
        };

        let now_empty = match self.users.get_mut(&user_id) {
            Some(conns) => {
                conns.remove(conn_id);
                conns.is_empty()
            }
            None => false,
        };

        if now_empty {
            self.users.remove(&user_id);
            tracing::info!(user_id = user_id.as_str(), conn_id = conn_id, "User offline");
            PresenceDrop::WentOffline { user_id }
        } else {
            PresenceDrop::StillOnline { user_id }
        }
    }

    /// Snapshot of online user ids, sorted.
    pub fn online_users(&self) -> Vec<String> {
        self.users.keys().cloned().collect()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.users.contains_key(user_id)
    }

    /// Live connections of a user (the user's personal channel).
    pub fn connections_of(&self, user_id: &str) -> Vec<String> {
        self.users
            .get(user_id)
            .map(|conns| conns.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn user_of(&self, conn_id: &str) -> Option<&str> {
        self.owners.get(conn_id).map(String::as_str)
    }

    pub fn online_count(&self) -> usize {
        self.users.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_online_fires_once_per_transition() {
        let mut presence = PresenceRegistry::new();

        let (change, _) = presence.connection_opened("alice", "c1");
        assert_eq!(change, PresenceChange::CameOnline);
        let (change, _) = presence.connection_opened("alice", "c2");
        assert_eq!(change, PresenceChange::AlreadyOnline);

        assert_eq!(
            presence.connection_closed("c1"),
            PresenceDrop::StillOnline { user_id: "alice".into() }
        );
        let (change, _) = presence.connection_opened("alice", "c3");
        assert_eq!(change, PresenceChange::AlreadyOnline);

        assert_eq!(
            presence.connection_closed("c2"),
            PresenceDrop::StillOnline { user_id: "alice".into() }
        );
        assert_eq!(
            presence.connection_closed("c3"),
            PresenceDrop::WentOffline { user_id: "alice".into() }
        );
        assert!(!presence.is_online("alice"));
    }

    #[test]
    fn test_close_without_setup_is_noop() {
        let mut presence = PresenceRegistry::new();
        presence.connection_opened("alice", "c1");
        assert_eq!(presence.connection_closed("c9"), PresenceDrop::Unbound);
        assert!(presence.is_online("alice"));
    }

    #[test]
    fn test_double_close_is_unbound() {
        let mut presence = PresenceRegistry::new();
        presence.connection_opened("alice", "c1");
        assert!(matches!(presence.connection_closed("c1"), PresenceDrop::WentOffline { .. }));
        assert_eq!(presence.connection_closed("c1"), PresenceDrop::Unbound);
    }

    #[test]
    fn test_repeated_setup_same_user() {
        let mut presence = PresenceRegistry::new();
        presence.connection_opened("alice", "c1");
        let (change, rebound) = presence.connection_opened("alice", "c1");
        assert_eq!(change, PresenceChange::AlreadyOnline);
        assert!(rebound.is_none());
        assert_eq!(presence.connections_of("alice"), vec!["c1".to_string()]);
    }

    #[test]
    fn test_rebind_to_other_user_releases_old() {
        let mut presence = PresenceRegistry::new();
        presence.connection_opened("alice", "c1");
        let (change, rebound) = presence.connection_opened("bob", "c1");
        assert_eq!(change, PresenceChange::CameOnline);
        assert_eq!(rebound, Some(PresenceDrop::WentOffline { user_id: "alice".into() }));
        assert_eq!(presence.user_of("c1"), Some("bob"));
        assert_eq!(presence.online_users(), vec!["bob".to_string()]);
    }

    #[test]
    fn test_online_snapshot_sorted() {
        let mut presence = PresenceRegistry::new();
        presence.connection_opened("carol", "c1");
        presence.connection_opened("alice", "c2");
        presence.connection_opened("bob", "c3");
        assert_eq!(presence.online_users(), vec!["alice", "bob", "carol"]);
        assert_eq!(presence.online_count(), 3);
    }
}
