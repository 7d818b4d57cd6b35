//! Presence entry and identifier types
//!
//! This module defines the per-user state stored in the registry and the
//! value types that flow in and out of it.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::config::BroadcastPolicy;

/// Identifier of a single live transport connection
///
/// Allocated by the transport layer; the registry only stores it.
pub type ConnectionId = u64;

/// Identifier a client claims for itself after connecting
///
/// Opaque to the registry and never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create a user id, returning `None` for an empty string
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.is_empty() {
            None
        } else {
            Some(Self(id))
        }
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Live connections currently claiming one user
///
/// The registry removes an entry as soon as its set becomes empty, so a
/// stored entry is never empty.
#[derive(Debug, Default)]
pub struct PresenceEntry {
    connections: HashSet<ConnectionId>,
}

impl PresenceEntry {
    pub(super) fn insert(&mut self, connection_id: ConnectionId) -> bool {
        self.connections.insert(connection_id)
    }

    pub(super) fn remove(&mut self, connection_id: ConnectionId) -> bool {
        self.connections.remove(&connection_id)
    }

    /// Check whether a connection belongs to this entry
    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.connections.contains(&connection_id)
    }

    /// Number of live connections for the user
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the user has no live connections left
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Iterate over the connection ids
    pub fn connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.connections.iter().copied()
    }
}

/// Count change produced by a single registry event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Distinct-user count before the event
    pub before: usize,
    /// Distinct-user count after the event
    pub after: usize,
    /// The event identified a connection or released a claim
    pub touched_claim: bool,
}

impl Transition {
    pub(super) fn new(before: usize, after: usize, touched_claim: bool) -> Self {
        Self {
            before,
            after,
            touched_claim,
        }
    }

    /// Whether the distinct-user count moved
    pub fn changed(&self) -> bool {
        self.before != self.after
    }

    /// Whether this transition must be announced under `policy`
    pub fn should_broadcast(&self, policy: BroadcastPolicy) -> bool {
        match policy {
            BroadcastPolicy::OnChange => self.changed(),
            BroadcastPolicy::EveryIdentify => self.changed() || self.touched_claim,
        }
    }
}

/// Point-in-time registry counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Distinct users with at least one live connection
    pub active_users: usize,
    /// Live connections, identified or not
    pub connections: usize,
    /// Live connections that claimed a user
    pub identified_connections: usize,
}
