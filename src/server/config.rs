//! Server configuration

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::protocol::constants::*;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Path of the WebSocket endpoint
    pub socket_path: String,

    /// Idle timeout (disconnect if no frame received, pongs included)
    pub idle_timeout: Duration,

    /// Interval between server pings (`None` = no pings)
    pub ping_interval: Option<Duration>,

    /// Send the current count to each peer right after it connects
    pub send_count_on_connect: bool,

    /// Largest inbound message accepted
    pub max_message_size: usize,

    /// How long a closing connection may spend flushing its queue
    pub drain_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            max_connections: 0, // Unlimited
            socket_path: DEFAULT_SOCKET_PATH.to_string(),
            idle_timeout: Duration::from_secs(60),
            ping_interval: Some(Duration::from_secs(25)),
            send_count_on_connect: true,
            max_message_size: MAX_MESSAGE_SIZE,
            drain_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the WebSocket path (a leading `/` is added if missing)
    pub fn socket_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.socket_path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        self
    }

    /// Set idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set ping interval, a zero interval disables pings
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = (!interval.is_zero()).then_some(interval);
        self
    }

    /// Do not send the current count to newly connected peers
    pub fn disable_count_on_connect(mut self) -> Self {
        self.send_count_on_connect = false;
        self
    }
}
