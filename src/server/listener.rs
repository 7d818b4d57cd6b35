//! Presence server listener
//!
//! Binds the TCP listener, owns the presence service for the lifetime of
//! the server and tears everything down in order on shutdown.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::error::Result;
use crate::registry::{PresenceService, RegistryConfig};
use crate::server::config::ServerConfig;
use crate::server::hub::PeerHub;
use crate::server::routes::{self, AppState};

/// Presence server
pub struct PresenceServer {
    config: ServerConfig,
    registry_config: RegistryConfig,
}

impl PresenceServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        Self::with_registry_config(config, RegistryConfig::default())
    }

    /// Create a new server with custom registry configuration
    pub fn with_registry_config(config: ServerConfig, registry_config: RegistryConfig) -> Self {
        Self {
            config,
            registry_config,
        }
    }

    /// Run the server
    ///
    /// This method blocks until the listener fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// Shutdown order: stop accepting, cancel every connection, wait until
    /// each has delivered its disconnect, then stop the presence service.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr()?;

        let hub = Arc::new(PeerHub::new());
        let (presence, service_task) =
            PresenceService::spawn(self.registry_config.clone(), Arc::clone(&hub));
        let state = AppState::new(self.config.clone(), presence.clone(), hub);
        let cancel = state.shutdown.clone();
        let tracker = state.tracker.clone();

        tracing::info!(
            addr = %local_addr,
            socket_path = %self.config.socket_path,
            policy = ?self.registry_config.broadcast_policy,
            "Presence server listening"
        );

        let app = routes::router(state).into_make_service_with_connect_info::<SocketAddr>();
        let signal = cancel.clone();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("Shutdown signal received");
                signal.cancel();
            })
            .await;

        // Also reached when the listener fails
        cancel.cancel();
        tracker.close();
        tracker.wait().await;

        match presence.shutdown().await {
            Ok(drained) if !drained.is_empty() => {
                tracing::warn!(connections = drained.len(), "Connections drained at shutdown");
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Presence service already stopped"),
        }
        if let Err(e) = service_task.await {
            tracing::error!(error = %e, "Presence service task failed");
        }

        tracing::info!(addr = %local_addr, "Presence server stopped");
        served?;
        Ok(())
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
