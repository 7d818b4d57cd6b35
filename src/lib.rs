//! Live active-user presence over WebSocket
//!
//! Tracks which distinct users currently have at least one live socket and
//! broadcasts that count to every connected peer whenever it changes.
//!
//! # Overview
//!
//! - [`registry`]: the presence state machine, the single-owner service
//!   task that serializes connect / identify / disconnect events, and the
//!   [`Broadcaster`](registry::Broadcaster) seam
//! - [`server`]: axum WebSocket endpoint, per-peer outbound queues and
//!   the HTTP polling endpoints
//! - [`protocol`]: JSON frames exchanged with clients
//! - [`session`]: per-connection lifecycle state
//! - [`stats`]: server-wide counters
//!
//! # Example
//!
//! ```no_run
//! use presence_rs::{PresenceServer, ServerConfig};
//!
//! # async fn example() -> presence_rs::Result<()> {
//! let config = ServerConfig::with_addr("127.0.0.1:3000".parse().unwrap());
//! let server = PresenceServer::new(config);
//!
//! server
//!     .run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! The registry can also be driven directly, without a transport:
//!
//! ```
//! use presence_rs::registry::{PresenceRegistry, UserId};
//!
//! let mut registry = PresenceRegistry::new();
//! registry.on_connect(1).unwrap();
//! registry.on_identify(1, UserId::new("alice").unwrap()).unwrap();
//! assert_eq!(registry.active_user_count(), 1);
//!
//! registry.on_disconnect(1);
//! assert_eq!(registry.active_user_count(), 0);
//! ```

pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use error::{Error, Result};
pub use registry::{
    BroadcastPolicy, Broadcaster, ConnectionId, PresenceHandle, PresenceRegistry,
    PresenceService, RegistryConfig, RegistryError, UserId,
};
pub use server::{PresenceServer, ServerConfig};
