//! Registry error types
//!
//! Both variants are invalid-state errors: they mean the transport layer
//! delivered an event that its own connection lifecycle cannot produce.
//! Redundant disconnects and same-user re-identification are not errors.

use thiserror::Error;

use super::entry::ConnectionId;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Connect for an id that is still live
    #[error("invalid state: connection {0} is already registered")]
    AlreadyConnected(ConnectionId),
    /// Identify for an id that was never connected or already disconnected
    #[error("invalid state: connection {0} is not registered")]
    UnknownConnection(ConnectionId),
}
