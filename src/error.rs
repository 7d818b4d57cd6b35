//! Crate error types

use thiserror::Error;

use crate::registry::RegistryError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Socket or listener failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Event rejected by the presence registry
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The presence service task has stopped
    #[error("presence service is not running")]
    ServiceClosed,

    /// Malformed or unserializable protocol message
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
