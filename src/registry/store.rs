//! Presence registry implementation
//!
//! The state machine that maps users to their live connections. It is a
//! plain owned value: serialization of events is the job of whoever owns
//! it (see [`PresenceService`](super::service::PresenceService)).

use std::collections::{HashMap, HashSet};

use super::entry::{ConnectionId, PresenceEntry, RegistryStats, Transition, UserId};
use super::error::RegistryError;

/// Registry of which users currently have live connections
///
/// Two maps are kept in agreement: `users` (user -> live connections) and
/// `owners` (connection -> claimed user, `None` until identified). Every
/// mutation validates before touching either map.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    /// Users with at least one live connection
    users: HashMap<UserId, PresenceEntry>,

    /// Every live connection and its claim
    owners: HashMap<ConnectionId, Option<UserId>>,

    /// Number of `owners` values that are `Some`
    identified: usize,
}

impl PresenceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection with no claimed user
    ///
    /// Fails if the id is already live.
    pub fn on_connect(&mut self, connection_id: ConnectionId) -> Result<Transition, RegistryError> {
        let count = self.active_user_count();

        if self.owners.contains_key(&connection_id) {
            return Err(RegistryError::AlreadyConnected(connection_id));
        }
        self.owners.insert(connection_id, None);

        tracing::debug!(
            connection_id = connection_id,
            connections = self.owners.len(),
            "Connection registered"
        );

        Ok(Transition::new(count, count, false))
    }

    /// Claim `user_id` for a live connection
    ///
    /// A previous claim for a different user is released first. Claiming the
    /// same user again changes nothing.
    pub fn on_identify(
        &mut self,
        connection_id: ConnectionId,
        user_id: UserId,
    ) -> Result<Transition, RegistryError> {
        let before = self.active_user_count();

        let slot = self
            .owners
            .get_mut(&connection_id)
            .ok_or(RegistryError::UnknownConnection(connection_id))?;

        if slot.as_ref() == Some(&user_id) {
            return Ok(Transition::new(before, before, true));
        }

        let previous = slot.replace(user_id.clone());
        match previous {
            Some(old) => {
                self.release(&old, connection_id);
                tracing::debug!(
                    connection_id = connection_id,
                    from = %old,
                    to = %user_id,
                    "Connection moved to another user"
                );
            }
            None => self.identified += 1,
        }

        self.users
            .entry(user_id)
            .or_default()
            .insert(connection_id);

        Ok(Transition::new(before, self.active_user_count(), true))
    }

    /// Remove a connection and release its claim
    ///
    /// Unknown or already-disconnected ids are ignored.
    pub fn on_disconnect(&mut self, connection_id: ConnectionId) -> Transition {
        let before = self.active_user_count();

        match self.owners.remove(&connection_id) {
            None => {
                tracing::trace!(connection_id = connection_id, "Disconnect for unknown connection");
                Transition::new(before, before, false)
            }
            Some(None) => Transition::new(before, before, false),
            Some(Some(user_id)) => {
                self.identified -= 1;
                self.release(&user_id, connection_id);
                Transition::new(before, self.active_user_count(), true)
            }
        }
    }

    /// Disconnect every live connection
    ///
    /// Returns the drained ids in ascending order.
    pub fn drain(&mut self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.owners.keys().copied().collect();
        ids.sort_unstable();

        for &id in &ids {
            self.on_disconnect(id);
        }

        ids
    }

    /// Number of distinct users with at least one live connection
    pub fn active_user_count(&self) -> usize {
        self.users.len()
    }

    /// Number of live connections, identified or not
    pub fn connection_count(&self) -> usize {
        self.owners.len()
    }

    /// Number of live connections that claimed a user
    pub fn identified_connection_count(&self) -> usize {
        self.identified
    }

    /// The user claimed by a connection, if any
    pub fn user_of(&self, connection_id: ConnectionId) -> Option<&UserId> {
        self.owners.get(&connection_id).and_then(Option::as_ref)
    }

    /// The live connections of a user
    pub fn connections_of(&self, user_id: &UserId) -> Option<&PresenceEntry> {
        self.users.get(user_id)
    }

    /// Snapshot of the registry counters
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            active_users: self.active_user_count(),
            connections: self.connection_count(),
            identified_connections: self.identified,
        }
    }

    /// Verify that both maps agree
    ///
    /// Returns a description of the first violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut claimed_users = HashSet::new();
        let mut identified = 0;

        for (&connection_id, owner) in &self.owners {
            let Some(user_id) = owner else { continue };
            identified += 1;
            claimed_users.insert(user_id);

            let listed = self
                .users
                .get(user_id)
                .is_some_and(|entry| entry.contains(connection_id));
            if !listed {
                return Err(format!(
                    "connection {connection_id} claims {user_id} but is not in its entry"
                ));
            }
        }

        for (user_id, entry) in &self.users {
            if entry.is_empty() {
                return Err(format!("user {user_id} has an empty entry"));
            }
            for connection_id in entry.connections() {
                if self.user_of(connection_id) != Some(user_id) {
                    return Err(format!(
                        "entry of {user_id} lists connection {connection_id} it does not own"
                    ));
                }
            }
        }

        if identified != self.identified {
            return Err(format!(
                "identified counter is {} but {identified} connections hold a claim",
                self.identified
            ));
        }
        if claimed_users.len() != self.users.len() {
            return Err(format!(
                "{} users present but {} distinct claims",
                self.users.len(),
                claimed_users.len()
            ));
        }

        Ok(())
    }

    fn release(&mut self, user_id: &UserId, connection_id: ConnectionId) {
        let now_empty = match self.users.get_mut(user_id) {
            Some(entry) => {
                entry.remove(connection_id);
                entry.is_empty()
            }
            None => false,
        };

        if now_empty {
            self.users.remove(user_id);
            tracing::debug!(user_id = %user_id, "User went offline");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    #[test]
    fn test_connect_is_not_counted() {
        let mut registry = PresenceRegistry::new();

        let transition = registry.on_connect(1).unwrap();
        assert!(!transition.changed());
        assert_eq!(registry.active_user_count(), 0);
        assert_eq!(registry.connection_count(), 1);
        registry.check_invariants().unwrap();
    }

    #[test]
    fn test_duplicate_connect_rejected() {
        let mut registry = PresenceRegistry::new();
        registry.on_connect(1).unwrap();

        let result = registry.on_connect(1);
        assert_eq!(result, Err(RegistryError::AlreadyConnected(1)));
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn test_identify_without_connect_rejected() {
        let mut registry = PresenceRegistry::new();

        let result = registry.on_identify(1, user("u1"));
        assert_eq!(result, Err(RegistryError::UnknownConnection(1)));
        assert_eq!(registry.active_user_count(), 0);
        registry.check_invariants().unwrap();
    }

    #[test]
    fn test_identify_after_disconnect_rejected() {
        let mut registry = PresenceRegistry::new();
        registry.on_connect(1).unwrap();
        registry.on_disconnect(1);

        assert!(matches!(
            registry.on_identify(1, user("u1")),
            Err(RegistryError::UnknownConnection(1))
        ));
    }

    #[test]
    fn test_two_connections_same_user() {
        let mut registry = PresenceRegistry::new();

        registry.on_connect(1).unwrap();
        registry.on_identify(1, user("u1")).unwrap();
        registry.on_connect(2).unwrap();
        let transition = registry.on_identify(2, user("u1")).unwrap();
        assert!(!transition.changed());
        assert_eq!(registry.active_user_count(), 1);

        // u1 still has connection 2
        let transition = registry.on_disconnect(1);
        assert!(!transition.changed());
        assert_eq!(registry.active_user_count(), 1);

        let transition = registry.on_disconnect(2);
        assert_eq!((transition.before, transition.after), (1, 0));
        assert_eq!(registry.active_user_count(), 0);
        registry.check_invariants().unwrap();
    }

    #[test]
    fn test_many_connections_one_user() {
        let mut registry = PresenceRegistry::new();

        for id in 0..10 {
            registry.on_connect(id).unwrap();
            registry.on_identify(id, user("shared")).unwrap();
        }

        assert_eq!(registry.active_user_count(), 1);
        assert_eq!(registry.connections_of(&user("shared")).unwrap().len(), 10);
        registry.check_invariants().unwrap();
    }

    #[test]
    fn test_distinct_users_then_disconnect_all() {
        let mut registry = PresenceRegistry::new();

        for id in 0..10u64 {
            registry.on_connect(id).unwrap();
            registry.on_identify(id, user(&format!("u{id}"))).unwrap();
        }
        assert_eq!(registry.active_user_count(), 10);

        for id in 0..10 {
            registry.on_disconnect(id);
        }
        assert_eq!(registry.active_user_count(), 0);
        assert_eq!(registry.connection_count(), 0);
        registry.check_invariants().unwrap();
    }

    #[test]
    fn test_reidentify_moves_claim() {
        let mut registry = PresenceRegistry::new();
        registry.on_connect(1).unwrap();
        registry.on_identify(1, user("a")).unwrap();

        // a had only this connection: a leaves, b arrives
        let transition = registry.on_identify(1, user("b")).unwrap();
        assert_eq!((transition.before, transition.after), (1, 1));
        assert!(registry.connections_of(&user("a")).is_none());
        assert_eq!(registry.user_of(1), Some(&user("b")));
        assert_eq!(registry.identified_connection_count(), 1);
        registry.check_invariants().unwrap();
    }

    #[test]
    fn test_reidentify_count_deltas() {
        let mut registry = PresenceRegistry::new();
        for id in 1..=3 {
            registry.on_connect(id).unwrap();
        }
        registry.on_identify(1, user("a")).unwrap();
        registry.on_identify(2, user("a")).unwrap();
        registry.on_identify(3, user("b")).unwrap();

        // a keeps connection 2, c is new: +1
        let transition = registry.on_identify(1, user("c")).unwrap();
        assert_eq!((transition.before, transition.after), (2, 3));

        // a loses its last connection, b already present: -1
        let transition = registry.on_identify(2, user("b")).unwrap();
        assert_eq!((transition.before, transition.after), (3, 2));
        registry.check_invariants().unwrap();
    }

    #[test]
    fn test_same_user_reidentify_is_noop() {
        let mut registry = PresenceRegistry::new();
        registry.on_connect(1).unwrap();
        registry.on_identify(1, user("u1")).unwrap();

        let transition = registry.on_identify(1, user("u1")).unwrap();
        assert!(!transition.changed());
        assert!(transition.touched_claim);
        assert_eq!(registry.identified_connection_count(), 1);
    }

    #[test]
    fn test_double_disconnect_is_noop() {
        let mut registry = PresenceRegistry::new();
        registry.on_connect(1).unwrap();
        registry.on_identify(1, user("u1")).unwrap();

        let first = registry.on_disconnect(1);
        let stats = registry.stats();
        let second = registry.on_disconnect(1);

        assert!(first.changed());
        assert!(!second.changed());
        assert!(!second.touched_claim);
        assert_eq!(registry.stats(), stats);
    }

    #[test]
    fn test_drain() {
        let mut registry = PresenceRegistry::new();
        for id in [3, 1, 2] {
            registry.on_connect(id).unwrap();
        }
        registry.on_identify(1, user("u1")).unwrap();
        registry.on_identify(2, user("u2")).unwrap();

        assert_eq!(registry.drain(), vec![1, 2, 3]);
        assert_eq!(registry.stats(), RegistryStats::default());
        registry.check_invariants().unwrap();
    }
}
