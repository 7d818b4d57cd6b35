//! Connection state machine
//!
//! Tracks one WebSocket connection from upgrade to close, as seen by the
//! transport. The presence registry keeps its own authoritative view; this
//! state exists for logging and per-connection bookkeeping.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::registry::{ConnectionId, UserId};

/// Connection lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Socket upgraded, no user claimed yet
    Connected,
    /// A user has been claimed
    Identified,
    /// Read loop finished, disconnect pending
    Closing,
    /// Disconnect delivered to the registry
    Closed,
}

/// Why a connection's read loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer sent a close frame or the stream ended
    PeerClosed,
    /// No frame within the idle timeout
    IdleTimeout,
    /// Server is shutting down
    Shutdown,
    /// Transport-level read error
    TransportError,
    /// The registry rejected an event for this connection
    InvalidState,
    /// The presence service is gone
    ServiceClosed,
}

/// Per-connection state
#[derive(Debug)]
pub struct ConnectionState {
    /// Connection ID shared with the registry
    pub id: ConnectionId,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Current phase
    pub phase: ConnectionPhase,

    /// Upgrade time
    pub connected_at: Instant,

    /// Time of the most recent identify
    pub identified_at: Option<Instant>,

    /// Currently claimed user
    pub user_id: Option<UserId>,

    /// Text frames received
    pub frames_received: u64,

    /// Frames rejected as malformed or unsupported
    pub frames_rejected: u64,

    /// Reason the read loop ended
    pub close_reason: Option<CloseReason>,
}

impl ConnectionState {
    /// Create state for a freshly upgraded connection
    pub fn new(id: ConnectionId, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            phase: ConnectionPhase::Connected,
            connected_at: Instant::now(),
            identified_at: None,
            user_id: None,
            frames_received: 0,
            frames_rejected: 0,
            close_reason: None,
        }
    }

    /// Record a successful identify
    ///
    /// Returns the previously claimed user, if it differs.
    pub fn identify(&mut self, user_id: UserId) -> Option<UserId> {
        if !self.is_open() {
            return None;
        }

        self.phase = ConnectionPhase::Identified;
        self.identified_at = Some(Instant::now());
        self.user_id
            .replace(user_id)
            .filter(|previous| Some(previous) != self.user_id.as_ref())
    }

    /// Start closing the connection
    pub fn close(&mut self, reason: CloseReason) {
        if self.is_open() {
            self.phase = ConnectionPhase::Closing;
            self.close_reason = Some(reason);
        }
    }

    /// Mark the disconnect as delivered
    pub fn mark_closed(&mut self) {
        self.phase = ConnectionPhase::Closed;
    }

    /// Whether the connection still accepts events
    pub fn is_open(&self) -> bool {
        matches!(
            self.phase,
            ConnectionPhase::Connected | ConnectionPhase::Identified
        )
    }

    /// Get connection duration
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
