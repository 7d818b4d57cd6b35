//! Presence wire protocol
//!
//! JSON text frames exchanged over the WebSocket plus the constants shared
//! by the server and its clients.

pub mod constants;
pub mod message;

pub use message::{ClientMessage, ServerMessage};
