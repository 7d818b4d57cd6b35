//! End-to-end tests: real WebSocket clients against a running server

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use presence_rs::protocol::constants::{ACTIVE_USERS_PATH, STATS_PATH};
use presence_rs::protocol::ServerMessage;
use presence_rs::server::{ActiveUsers, StatsResponse};
use presence_rs::{BroadcastPolicy, PresenceServer, RegistryConfig, ServerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<presence_rs::Result<()>>,
}

impl TestServer {
    async fn start(config: ServerConfig, registry_config: RegistryConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();

        let server = PresenceServer::with_registry_config(config, registry_config);
        let task = tokio::spawn(async move {
            server
                .serve(listener, async move {
                    let _ = rx.await;
                })
                .await
        });

        Self {
            addr,
            shutdown: Some(tx),
            task,
        }
    }

    async fn start_default() -> Self {
        Self::start(ServerConfig::default(), RegistryConfig::default()).await
    }

    async fn connect(&self) -> Client {
        let url = format!("ws://{}/socket", self.addr);
        let (ws, _resp) = connect_async(url).await.unwrap();
        ws
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> T {
        let mut stream = TcpStream::connect(self.addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");

        let (_, body) = response.split_once("\r\n\r\n").unwrap();
        serde_json::from_str(body).unwrap()
    }

    async fn active_users(&self) -> usize {
        self.get::<ActiveUsers>(ACTIVE_USERS_PATH).await.count
    }

    /// Poll the stats endpoint until `done` holds
    async fn wait_for(&self, done: impl Fn(&StatsResponse) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let stats: StatsResponse = self.get(STATS_PATH).await;
                if done(&stats) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    async fn stop(mut self) -> presence_rs::Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task.await.unwrap()
    }
}

async fn login(ws: &mut Client, user_id: &str) {
    let frame = serde_json::json!({ "type": "userLogin", "userId": user_id }).to_string();
    ws.send(WsMessage::Text(frame)).await.unwrap();
}

async fn recv(ws: &mut Client) -> ServerMessage {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await.unwrap().unwrap() {
                WsMessage::Text(text) => return serde_json::from_str::<ServerMessage>(&text).unwrap(),
                WsMessage::Ping(_) | WsMessage::Pong(_) => {}
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    })
    .await
    .expect("no message received")
}

fn count(count: usize) -> ServerMessage {
    ServerMessage::ActiveUsersCount { count }
}

#[tokio::test]
async fn test_two_sockets_one_user() {
    let server = TestServer::start_default().await;

    let mut c1 = server.connect().await;
    assert_eq!(recv(&mut c1).await, count(0));
    login(&mut c1, "u1").await;
    assert_eq!(recv(&mut c1).await, count(1));

    let mut c2 = server.connect().await;
    assert_eq!(recv(&mut c2).await, count(1));
    login(&mut c2, "u1").await;
    server
        .wait_for(|s| s.registry.identified_connections == 2)
        .await;
    assert_eq!(server.active_users().await, 1);

    // u1 still has c2
    c1.close(None).await.unwrap();
    server.wait_for(|s| s.registry.connections == 1).await;
    assert_eq!(server.active_users().await, 1);

    c2.close(None).await.unwrap();
    server.wait_for(|s| s.registry.connections == 0).await;
    assert_eq!(server.active_users().await, 0);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_broadcast_reaches_every_peer() {
    let server = TestServer::start_default().await;

    let mut c1 = server.connect().await;
    let mut c2 = server.connect().await;
    assert_eq!(recv(&mut c1).await, count(0));
    assert_eq!(recv(&mut c2).await, count(0));

    login(&mut c1, "alice").await;
    assert_eq!(recv(&mut c1).await, count(1));
    assert_eq!(recv(&mut c2).await, count(1));

    login(&mut c2, "bob").await;
    assert_eq!(recv(&mut c1).await, count(2));
    assert_eq!(recv(&mut c2).await, count(2));

    drop(c2);
    assert_eq!(recv(&mut c1).await, count(1));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_reidentify_moves_user() {
    let server = TestServer::start_default().await;

    let mut c1 = server.connect().await;
    let mut c2 = server.connect().await;
    recv(&mut c1).await;
    recv(&mut c2).await;

    login(&mut c1, "a").await;
    assert_eq!(recv(&mut c1).await, count(1));
    login(&mut c2, "b").await;
    assert_eq!(recv(&mut c1).await, count(2));

    // a had only c1, b already present: 2 -> 1
    login(&mut c1, "b").await;
    assert_eq!(recv(&mut c1).await, count(1));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_invalid_frames_are_rejected() {
    let server = TestServer::start_default().await;
    let mut ws = server.connect().await;
    recv(&mut ws).await;

    ws.send(WsMessage::Text("not json".to_string())).await.unwrap();
    assert!(matches!(recv(&mut ws).await, ServerMessage::Error { .. }));

    login(&mut ws, "").await;
    assert_eq!(
        recv(&mut ws).await,
        ServerMessage::error("userId must not be empty")
    );

    // Connection is still usable
    login(&mut ws, "carol").await;
    assert_eq!(recv(&mut ws).await, count(1));

    // Binary frames are counted and rejected without a reply
    ws.send(WsMessage::Binary(vec![1, 2, 3])).await.unwrap();

    server
        .wait_for(|s| s.server.frames_rejected == 3 && s.server.frames_received == 4)
        .await;
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_every_identify_policy() {
    let server = TestServer::start(
        ServerConfig::default().disable_count_on_connect(),
        RegistryConfig::default().broadcast_policy(BroadcastPolicy::EveryIdentify),
    )
    .await;
    let mut ws = server.connect().await;

    login(&mut ws, "dave").await;
    assert_eq!(recv(&mut ws).await, count(1));
    login(&mut ws, "dave").await;
    assert_eq!(recv(&mut ws).await, count(1));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_connection_limit() {
    let server = TestServer::start(
        ServerConfig::default().max_connections(1),
        RegistryConfig::default(),
    )
    .await;

    let mut first = server.connect().await;
    recv(&mut first).await;

    let url = format!("ws://{}/socket", server.addr);
    assert!(connect_async(url).await.is_err());

    server.wait_for(|s| s.server.rejected_connections == 1).await;
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_connections() {
    let server = TestServer::start_default().await;

    let mut ws = server.connect().await;
    recv(&mut ws).await;
    login(&mut ws, "erin").await;
    assert_eq!(recv(&mut ws).await, count(1));

    server.stop().await.unwrap();

    // The socket ends with a close frame or EOF
    let end = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                None | Some(Err(_)) | Some(Ok(WsMessage::Close(_))) => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(end.is_ok());
}

#[tokio::test]
async fn test_idle_connection_releases_user() {
    let server = TestServer::start(
        ServerConfig::default().idle_timeout(Duration::from_millis(300)),
        RegistryConfig::default(),
    )
    .await;

    let mut ws = server.connect().await;
    recv(&mut ws).await;
    login(&mut ws, "frank").await;
    assert_eq!(recv(&mut ws).await, count(1));

    // Client goes silent
    server
        .wait_for(|s| s.registry.connections == 0 && s.server.active_connections == 0)
        .await;
    assert_eq!(server.active_users().await, 0);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_zero_ping_interval_still_disconnects() {
    let server = TestServer::start(
        ServerConfig::default().ping_interval(Duration::ZERO),
        RegistryConfig::default(),
    )
    .await;

    let mut ws = server.connect().await;
    assert_eq!(recv(&mut ws).await, count(0));
    login(&mut ws, "gina").await;
    assert_eq!(recv(&mut ws).await, count(1));

    drop(ws);
    server
        .wait_for(|s| s.registry.connections == 0 && s.server.active_connections == 0)
        .await;
    assert_eq!(server.active_users().await, 0);

    server.stop().await.unwrap();
}
