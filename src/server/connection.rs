//! WebSocket connection handler
//!
//! Each upgraded socket runs one [`Connection`]: a read loop that turns
//! frames into presence events and a writer task that drains the peer's
//! outbound queue. The disconnect event is sent exactly once, after the
//! read loop ends for whatever reason.

use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval};

use crate::error::Error;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::registry::{ConnectionId, UserId};
use crate::server::hub::PeerSender;
use crate::server::routes::AppState;
use crate::session::{CloseReason, ConnectionState};

/// A single live WebSocket connection
pub(crate) struct Connection {
    state: ConnectionState,
    app: AppState,
}

impl Connection {
    pub fn new(id: ConnectionId, peer_addr: SocketAddr, app: AppState) -> Self {
        Self {
            state: ConnectionState::new(id, peer_addr),
            app,
        }
    }

    pub async fn run(mut self, socket: WebSocket) {
        let id = self.state.id;

        // The queue must be reachable before the service sends the snapshot
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        self.app.hub.register(id, tx.clone());

        let connected = if self.app.config.send_count_on_connect {
            self.app.presence.connect_with_snapshot(id).await
        } else {
            self.app.presence.connect(id).await
        };
        if let Err(e) = connected {
            tracing::error!(connection_id = id, error = %e, "Failed to register connection");
            self.app.hub.unregister(id);
            return;
        }
        self.app.stats.connection_opened();

        let (mut sink, mut stream) = socket.split();

        tracing::info!(
            connection_id = id,
            peer = %self.state.peer_addr,
            "WebSocket connection established"
        );

        let mut writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reason = self.read_loop(&mut stream, &tx).await;
        self.state.close(reason);

        // Stop broadcasts to this peer before the count drops
        self.app.hub.unregister(id);
        match self.app.presence.disconnect(id).await {
            Ok(count) => tracing::debug!(connection_id = id, count = count, "Disconnect delivered"),
            Err(e) => tracing::warn!(connection_id = id, error = %e, "Disconnect not delivered"),
        }
        self.state.mark_closed();
        self.app.stats.connection_closed();

        if reason != CloseReason::PeerClosed {
            let _ = tx.send(Message::Close(None));
        }
        drop(tx);
        if tokio::time::timeout(self.app.config.drain_timeout, &mut writer)
            .await
            .is_err()
        {
            writer.abort();
        }

        tracing::info!(
            connection_id = id,
            reason = ?reason,
            duration_ms = self.state.duration().as_millis() as u64,
            frames = self.state.frames_received,
            "WebSocket connection closed"
        );
    }

    async fn read_loop(
        &mut self,
        stream: &mut SplitStream<WebSocket>,
        tx: &PeerSender,
    ) -> CloseReason {
        let shutdown = self.app.shutdown.clone();
        let idle_timeout = self.app.config.idle_timeout;
        let mut ping = self
            .app
            .config
            .ping_interval
            .filter(|period| !period.is_zero())
            .map(|period| {
                let mut ping = tokio::time::interval(period);
                ping.reset();
                ping
            });
        let mut last_seen = Instant::now();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return CloseReason::Shutdown,
                _ = tokio::time::sleep_until(last_seen + idle_timeout) => {
                    tracing::debug!(connection_id = self.state.id, "Idle timeout");
                    return CloseReason::IdleTimeout;
                }
                _ = next_ping(&mut ping) => {
                    let _ = tx.send(Message::Ping(Bytes::new()));
                }
                frame = stream.next() => {
                    let message = match frame {
                        None => return CloseReason::PeerClosed,
                        Some(Err(e)) => {
                            tracing::debug!(connection_id = self.state.id, error = %e, "WebSocket read error");
                            return CloseReason::TransportError;
                        }
                        Some(Ok(message)) => message,
                    };
                    last_seen = Instant::now();

                    match message {
                        Message::Text(text) => {
                            if let Err(reason) = self.handle_text(text.as_str(), tx).await {
                                return reason;
                            }
                        }
                        Message::Close(_) => return CloseReason::PeerClosed,
                        Message::Binary(_) => {
                            tracing::debug!(connection_id = self.state.id, "Ignoring binary frame");
                            self.count_frame();
                            self.reject_frame();
                        }
                        Message::Ping(_) | Message::Pong(_) => {}
                    }
                }
            }
        }
    }

    async fn handle_text(&mut self, text: &str, tx: &PeerSender) -> Result<(), CloseReason> {
        let id = self.state.id;
        self.count_frame();

        let message = match ClientMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(connection_id = id, error = %e, "Failed to parse message");
                self.reject_frame();
                send_message(tx, &ServerMessage::error(format!("invalid message: {e}")));
                return Ok(());
            }
        };

        match message {
            ClientMessage::UserLogin { user_id } => {
                let Some(user_id) = UserId::new(user_id) else {
                    self.reject_frame();
                    send_message(tx, &ServerMessage::error("userId must not be empty"));
                    return Ok(());
                };
                self.identify(user_id).await
            }
        }
    }

    async fn identify(&mut self, user_id: UserId) -> Result<(), CloseReason> {
        let id = self.state.id;

        match self.app.presence.identify(id, user_id.clone()).await {
            Ok(count) => {
                let previous = self.state.identify(user_id.clone());
                tracing::info!(
                    connection_id = id,
                    user_id = %user_id,
                    previous = ?previous.as_ref().map(UserId::as_str),
                    count = count,
                    "User identified"
                );
                Ok(())
            }
            Err(Error::Registry(e)) => {
                tracing::error!(connection_id = id, error = %e, "Identify rejected");
                Err(CloseReason::InvalidState)
            }
            Err(e) => {
                tracing::error!(connection_id = id, error = %e, "Identify failed");
                Err(CloseReason::ServiceClosed)
            }
        }
    }

    fn count_frame(&mut self) {
        self.state.frames_received += 1;
        self.app.stats.frame_received();
    }

    fn reject_frame(&mut self) {
        self.state.frames_rejected += 1;
        self.app.stats.frame_rejected();
    }
}

/// Wait for the next ping, forever when pings are disabled
async fn next_ping(ping: &mut Option<Interval>) {
    match ping {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn send_message(tx: &PeerSender, message: &ServerMessage) {
    match message.encode() {
        Ok(text) => {
            // Err means the writer is gone; the read loop will notice
            let _ = tx.send(Message::Text(text.into()));
        }
        Err(e) => tracing::error!(error = %e, "Failed to encode server message"),
    }
}
