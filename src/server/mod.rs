//! Presence server
//!
//! WebSocket transport and HTTP endpoints around the presence service.

pub mod config;
pub mod connection;
pub mod hub;
pub mod listener;
pub mod routes;

pub use config::ServerConfig;
pub use hub::PeerHub;
pub use listener::PresenceServer;
pub use routes::{ActiveUsers, StatsResponse};
