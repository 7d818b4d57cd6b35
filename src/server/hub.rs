//! Per-peer outbound queues
//!
//! Every connection owns an unbounded queue drained by its own writer task.
//! Broadcasting only enqueues, so a slow socket never stalls the presence
//! service. The frame is serialized once; cloning a text message shares
//! the underlying buffer.

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::protocol::ServerMessage;
use crate::registry::{Broadcaster, ConnectionId};

/// Sender half of a peer's outbound queue
pub type PeerSender = mpsc::UnboundedSender<Message>;

/// Registry of connected peers' outbound queues
#[derive(Debug, Default)]
pub struct PeerHub {
    peers: DashMap<ConnectionId, PeerSender>,
}

impl PeerHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peer's queue
    pub fn register(&self, connection_id: ConnectionId, sender: PeerSender) {
        self.peers.insert(connection_id, sender);
    }

    /// Remove a peer's queue
    pub fn unregister(&self, connection_id: ConnectionId) -> bool {
        self.peers.remove(&connection_id).is_some()
    }

    /// Queue a message for one peer
    ///
    /// Returns false if the peer is unknown, gone, or the message could not
    /// be encoded.
    pub fn send_to(&self, connection_id: ConnectionId, message: &ServerMessage) -> bool {
        let Some(frame) = encode(message) else {
            return false;
        };

        match self.peers.get(&connection_id) {
            Some(sender) => sender.send(frame).is_ok(),
            None => false,
        }
    }

    /// Number of registered peers
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

impl Broadcaster for PeerHub {
    fn broadcast(&self, count: usize) {
        let Some(frame) = encode(&ServerMessage::ActiveUsersCount { count }) else {
            return;
        };

        let mut closed = Vec::new();
        let mut delivered = 0usize;
        for peer in self.peers.iter() {
            if peer.value().send(frame.clone()).is_ok() {
                delivered += 1;
            } else {
                closed.push(*peer.key());
            }
        }

        // Removal must happen after iteration releases its shard locks
        for connection_id in &closed {
            self.peers.remove(connection_id);
        }

        tracing::debug!(
            count = count,
            peers = delivered,
            dropped = closed.len(),
            "Active user count broadcast"
        );
    }

    fn send_count(&self, connection_id: ConnectionId, count: usize) {
        if !self.send_to(connection_id, &ServerMessage::ActiveUsersCount { count }) {
            tracing::debug!(connection_id = connection_id, "Count snapshot not delivered");
        }
    }
}

fn encode(message: &ServerMessage) -> Option<Message> {
    match message.encode() {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode server message");
            None
        }
    }
}
