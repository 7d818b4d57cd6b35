//! Presence registry and its owning service
//!
//! The registry tracks which distinct users currently have at least one
//! live connection. A single service task owns it and serializes every
//! connect / identify / disconnect event; the transport announces the
//! resulting count through a [`Broadcaster`].
//!
//! # Architecture
//!
//! ```text
//!   [Connection]   [Connection]   [Connection]      GET /api/active-users
//!        │              │              │                     │
//!        └──── PresenceHandle (mpsc + oneshot) ────┐         │
//!                                                  ▼         │
//!                                  ┌───────────────────────┐ │
//!                                  │ PresenceService task  │ │
//!                                  │  PresenceRegistry {   │ │
//!                                  │    users: user → ids, │ │
//!                                  │    owners: id → user, │ │
//!                                  │  }                    │ │
//!                                  └───────┬───────┬───────┘ │
//!                                          │       │         │
//!                              watch<usize>│       │Broadcaster::broadcast(count)
//!                                          ▼       ▼         │
//!                         active_user_count()   PeerHub ──► per-peer queues ──► sockets
//! ```
//!
//! # Counting Policy
//!
//! Only identified connections count: a user is present while at least
//! one connection claims it. By default the count is announced only when
//! it changes ([`BroadcastPolicy::OnChange`]).

pub mod broadcast;
pub mod config;
pub mod entry;
pub mod error;
pub mod service;
pub mod store;

pub use broadcast::Broadcaster;
pub use config::{BroadcastPolicy, RegistryConfig};
pub use entry::{ConnectionId, PresenceEntry, RegistryStats, Transition, UserId};
pub use error::RegistryError;
pub use service::{PresenceHandle, PresenceService};
pub use store::PresenceRegistry;
