//! Broadcast capability used to announce the active-user count
//!
//! The registry never talks to sockets. Whoever owns the transport
//! implements [`Broadcaster`] and receives the absolute count after each
//! count-affecting event.

use std::sync::Arc;

use tokio::sync::broadcast;

use super::entry::ConnectionId;

/// Fan-out of the active-user count to connected peers
///
/// Implementations must not block: they are called from the presence
/// service's update loop. Delivery is best-effort and the payload is
/// idempotent, so dropped or repeated sends are acceptable.
pub trait Broadcaster: Send + Sync + 'static {
    /// Deliver `count` to every currently connected peer
    fn broadcast(&self, count: usize);

    /// Deliver `count` to one peer that just connected
    ///
    /// Called from the same loop as [`broadcast`](Self::broadcast), so the
    /// peer never sees this snapshot after a newer count. Transports without
    /// addressable peers can ignore it.
    fn send_count(&self, _connection_id: ConnectionId, _count: usize) {}
}

impl<B: Broadcaster + ?Sized> Broadcaster for Arc<B> {
    fn broadcast(&self, count: usize) {
        (**self).broadcast(count)
    }

    fn send_count(&self, connection_id: ConnectionId, count: usize) {
        (**self).send_count(connection_id, count)
    }
}

/// In-process fan-out through a `tokio::sync::broadcast` channel
///
/// Lagging receivers see `RecvError::Lagged` and skip to the latest count.
impl Broadcaster for broadcast::Sender<usize> {
    fn broadcast(&self, count: usize) {
        // Err only means there are no receivers right now
        let _ = self.send(count);
    }
}
