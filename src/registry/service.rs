//! Single-owner presence service
//!
//! One task owns the [`PresenceRegistry`] and applies commands from an mpsc
//! channel strictly one at a time. Transport tasks talk to it through a
//! cloneable [`PresenceHandle`]; each call waits for its own reply, which
//! keeps per-connection event order.

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

use super::broadcast::Broadcaster;
use super::config::RegistryConfig;
use super::entry::{ConnectionId, RegistryStats, Transition, UserId};
use super::error::RegistryError;
use super::store::PresenceRegistry;

/// Commands accepted by the presence service
#[derive(Debug)]
enum PresenceCommand {
    Connect {
        connection_id: ConnectionId,
        snapshot: bool,
        reply: oneshot::Sender<std::result::Result<(), RegistryError>>,
    },
    Identify {
        connection_id: ConnectionId,
        user_id: UserId,
        reply: oneshot::Sender<std::result::Result<usize, RegistryError>>,
    },
    Disconnect {
        connection_id: ConnectionId,
        reply: oneshot::Sender<usize>,
    },
    Stats {
        reply: oneshot::Sender<RegistryStats>,
    },
    Shutdown {
        reply: oneshot::Sender<Vec<ConnectionId>>,
    },
}

/// Task that owns the registry
pub struct PresenceService<B: Broadcaster> {
    registry: PresenceRegistry,
    config: RegistryConfig,
    broadcaster: B,
    commands: mpsc::Receiver<PresenceCommand>,
    count_tx: watch::Sender<usize>,
}

impl<B: Broadcaster> PresenceService<B> {
    /// Spawn the service on the current runtime
    ///
    /// The task exits after [`PresenceHandle::shutdown`] or once every
    /// handle has been dropped; either way the registry is drained.
    pub fn spawn(config: RegistryConfig, broadcaster: B) -> (PresenceHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.command_buffer);
        let (count_tx, count_rx) = watch::channel(0);

        let service = Self {
            registry: PresenceRegistry::new(),
            config,
            broadcaster,
            commands: rx,
            count_tx,
        };
        let handle = PresenceHandle {
            commands: tx,
            count: count_rx,
        };

        (handle, tokio::spawn(service.run()))
    }

    async fn run(mut self) {
        tracing::debug!(policy = ?self.config.broadcast_policy, "Presence service started");

        while let Some(command) = self.commands.recv().await {
            match command {
                PresenceCommand::Connect {
                    connection_id,
                    snapshot,
                    reply,
                } => {
                    let result = self
                        .registry
                        .on_connect(connection_id)
                        .map(|transition| {
                            let count = self.publish(transition);
                            if snapshot {
                                self.broadcaster.send_count(connection_id, count);
                            }
                        });
                    let _ = reply.send(result);
                }
                PresenceCommand::Identify {
                    connection_id,
                    user_id,
                    reply,
                } => {
                    let result = self
                        .registry
                        .on_identify(connection_id, user_id)
                        .map(|transition| self.publish(transition));
                    let _ = reply.send(result);
                }
                PresenceCommand::Disconnect {
                    connection_id,
                    reply,
                } => {
                    let transition = self.registry.on_disconnect(connection_id);
                    let _ = reply.send(self.publish(transition));
                }
                PresenceCommand::Stats { reply } => {
                    let _ = reply.send(self.registry.stats());
                }
                PresenceCommand::Shutdown { reply } => {
                    let drained = self.drain();
                    let _ = reply.send(drained);
                    tracing::debug!("Presence service stopped");
                    return;
                }
            }
        }

        self.drain();
        tracing::debug!("Presence service stopped, all handles dropped");
    }

    fn drain(&mut self) -> Vec<ConnectionId> {
        let before = self.registry.active_user_count();
        let drained = self.registry.drain();

        if !drained.is_empty() {
            tracing::info!(connections = drained.len(), "Drained live connections");
        }
        self.publish(Transition {
            before,
            after: self.registry.active_user_count(),
            touched_claim: false,
        });

        drained
    }

    /// Record the new count and broadcast it if the policy asks for it
    fn publish(&self, transition: Transition) -> usize {
        let count = transition.after;
        self.count_tx.send_if_modified(|current| {
            let modified = *current != count;
            *current = count;
            modified
        });

        if transition.should_broadcast(self.config.broadcast_policy) {
            tracing::debug!(count = count, "Broadcasting active user count");
            self.broadcaster.broadcast(count);
        }

        count
    }
}

/// Cloneable handle to a running presence service
#[derive(Debug, Clone)]
pub struct PresenceHandle {
    commands: mpsc::Sender<PresenceCommand>,
    count: watch::Receiver<usize>,
}

impl PresenceHandle {
    /// Register a new connection
    pub async fn connect(&self, connection_id: ConnectionId) -> Result<()> {
        self.register(connection_id, false).await
    }

    /// Register a new connection and send it the current count
    ///
    /// The count goes out through [`Broadcaster::send_count`] from inside
    /// the service, ordered with every broadcast before and after it.
    pub async fn connect_with_snapshot(&self, connection_id: ConnectionId) -> Result<()> {
        self.register(connection_id, true).await
    }

    async fn register(&self, connection_id: ConnectionId, snapshot: bool) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(PresenceCommand::Connect {
            connection_id,
            snapshot,
            reply,
        })
        .await?;

        rx.await.map_err(|_| Error::ServiceClosed)??;
        Ok(())
    }

    /// Claim a user for a connection, returning the new active-user count
    pub async fn identify(&self, connection_id: ConnectionId, user_id: UserId) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(PresenceCommand::Identify {
            connection_id,
            user_id,
            reply,
        })
        .await?;

        Ok(rx.await.map_err(|_| Error::ServiceClosed)??)
    }

    /// Release a connection, returning the new active-user count
    ///
    /// Disconnecting an unknown connection is not an error.
    pub async fn disconnect(&self, connection_id: ConnectionId) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(PresenceCommand::Disconnect {
            connection_id,
            reply,
        })
        .await?;

        rx.await.map_err(|_| Error::ServiceClosed)
    }

    /// Current number of distinct active users
    ///
    /// Reads the last published value without a round trip to the service.
    pub fn active_user_count(&self) -> usize {
        *self.count.borrow()
    }

    /// Watch the active-user count
    pub fn subscribe_count(&self) -> watch::Receiver<usize> {
        self.count.clone()
    }

    /// Snapshot of the registry counters
    pub async fn stats(&self) -> Result<RegistryStats> {
        let (reply, rx) = oneshot::channel();
        self.send(PresenceCommand::Stats { reply }).await?;

        rx.await.map_err(|_| Error::ServiceClosed)
    }

    /// Stop the service, returning the connections it had to drain
    pub async fn shutdown(&self) -> Result<Vec<ConnectionId>> {
        let (reply, rx) = oneshot::channel();
        self.send(PresenceCommand::Shutdown { reply }).await?;

        rx.await.map_err(|_| Error::ServiceClosed)
    }

    async fn send(&self, command: PresenceCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::ServiceClosed)
    }
}
