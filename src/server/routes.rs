//! HTTP routes
//!
//! The WebSocket endpoint plus the polling and health endpoints.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::protocol::constants::{ACTIVE_USERS_PATH, HEALTH_PATH, STATS_PATH};
use crate::registry::{PresenceHandle, RegistryStats};
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::server::hub::PeerHub;
use crate::stats::{ServerStats, ServerStatsSnapshot};

/// State shared by every route
#[derive(Clone)]
pub(crate) struct AppState {
    pub config: Arc<ServerConfig>,
    pub presence: PresenceHandle,
    pub hub: Arc<PeerHub>,
    pub stats: Arc<ServerStats>,
    pub next_connection_id: Arc<AtomicU64>,
    pub connection_semaphore: Option<Arc<Semaphore>>,
    pub shutdown: CancellationToken,
    pub tracker: TaskTracker,
}

impl AppState {
    pub fn new(config: ServerConfig, presence: PresenceHandle, hub: Arc<PeerHub>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config: Arc::new(config),
            presence,
            hub,
            stats: Arc::new(ServerStats::new()),
            next_connection_id: Arc::new(AtomicU64::new(1)),
            connection_semaphore,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Take a connection slot, `Err` when the limit is reached
    fn admit(&self) -> Result<Option<OwnedSemaphorePermit>, ()> {
        match self.connection_semaphore {
            Some(ref sem) => sem.clone().try_acquire_owned().map(Some).map_err(|_| ()),
            None => Ok(None),
        }
    }
}

/// Body of `GET /api/active-users`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveUsers {
    pub count: usize,
}

/// Body of `GET /api/stats`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsResponse {
    pub server: ServerStatsSnapshot,
    pub registry: RegistryStats,
}

pub(crate) fn router(state: AppState) -> Router {
    let socket_path = state.config.socket_path.clone();

    Router::new()
        .route(&socket_path, get(socket_handler))
        .route(ACTIVE_USERS_PATH, get(active_users))
        .route(STATS_PATH, get(stats))
        .route(HEALTH_PATH, get(health))
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn socket_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    if state.shutdown.is_cancelled() {
        state.stats.connection_rejected();
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }

    let permit = match state.admit() {
        Ok(permit) => permit,
        Err(()) => {
            tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
            state.stats.connection_rejected();
            return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
        }
    };

    let connection_id = state.next_connection_id.fetch_add(1, Ordering::Relaxed);
    let tracker = state.tracker.clone();

    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| {
            tracker.track_future(async move {
                Connection::new(connection_id, peer_addr, state)
                    .run(socket)
                    .await;
                drop(permit);
            })
        })
}

async fn active_users(State(state): State<AppState>) -> Json<ActiveUsers> {
    Json(ActiveUsers {
        count: state.presence.active_user_count(),
    })
}

async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, StatusCode> {
    let registry = state
        .presence
        .stats()
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    Ok(Json(StatsResponse {
        server: state.stats.snapshot(),
        registry,
    }))
}

async fn health() -> &'static str {
    "ok"
}
