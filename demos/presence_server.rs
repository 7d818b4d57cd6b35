//! Presence server demo
//!
//! Run with: cargo run --example presence_server [BIND_ADDR] [--announce-every-identify]
//!
//! Examples:
//!   cargo run --example presence_server                  # binds to 0.0.0.0:$PORT (default 3000)
//!   cargo run --example presence_server localhost        # binds to 127.0.0.1:3000
//!   cargo run --example presence_server 127.0.0.1:3001   # binds to 127.0.0.1:3001
//!
//! ## Connecting
//!
//! With websocat:
//!   websocat ws://localhost:3000/socket
//!   {"type":"userLogin","userId":"alice"}
//!
//! Every peer then receives `{"type":"activeUsersCount","count":N}` when the
//! number of distinct logged-in users changes.
//!
//! ## Polling
//!
//!   curl http://localhost:3000/api/active-users
//!   curl http://localhost:3000/api/stats

use std::net::{IpAddr, SocketAddr};

use presence_rs::protocol::constants::DEFAULT_PORT;
use presence_rs::{BroadcastPolicy, PresenceServer, RegistryConfig, ServerConfig};

/// Port from `PORT`, falling back to the protocol default
fn default_port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

/// Parse bind address from command line argument
///
/// Supports formats:
/// - IP:PORT (e.g., "127.0.0.1:3001")
/// - IP only (e.g., "127.0.0.1") - uses the default port
/// - "localhost" or "localhost:PORT"
fn parse_bind_addr(arg: &str, port: u16) -> Result<SocketAddr, String> {
    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = normalized.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: presence_server [BIND_ADDR] [--announce-every-identify]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR                  Address to bind to (default: 0.0.0.0:$PORT, PORT=3000)");
    eprintln!("  --announce-every-identify  Re-broadcast the count on every login");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let port = default_port();
    let bind_addr = match args.iter().find(|a| !a.starts_with("--")) {
        Some(addr_str) => match parse_bind_addr(addr_str, port) {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => SocketAddr::from(([0, 0, 0, 0], port)),
    };

    let policy = if args.iter().any(|a| a == "--announce-every-identify") {
        BroadcastPolicy::EveryIdentify
    } else {
        BroadcastPolicy::OnChange
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("presence_rs=debug".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    let config = ServerConfig::with_addr(bind_addr);
    println!("Starting presence server on {}", config.bind_addr);
    println!("WebSocket: ws://{}{}", config.bind_addr, config.socket_path);
    println!();

    let server = PresenceServer::with_registry_config(
        config,
        RegistryConfig::default().broadcast_policy(policy),
    );

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    println!("Server stopped");
    Ok(())
}
