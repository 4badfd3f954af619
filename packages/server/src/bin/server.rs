//! Hanabi realtime store server.
//!
//! Hosts the shared room documents over WebSocket and expires stale confetti.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin hanabi-server
//! cargo run --bin hanabi-server -- --host 0.0.0.0 --port 3000
//! ```

use std::time::Duration;

use clap::Parser;
use hanabi_core::infrastructure::store::InMemoryRealtimeStore;
use hanabi_server::ui::{Heartbeat, Server, ServerConfig};
use hanabi_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "hanabi-server")]
#[command(about = "Realtime store server for Hanabi planning poker", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Seconds after which leftover confetti events are deleted
    #[arg(long, default_value = "5")]
    confetti_ttl_secs: u64,

    /// Interval of the confetti expiry sweep in milliseconds
    #[arg(long, default_value = "1000")]
    sweep_interval_ms: u64,

    /// Interval of the WebSocket ping in seconds
    #[arg(long, default_value = "10")]
    heartbeat_secs: u64,

    /// Seconds without any frame from a client before it is disconnected
    #[arg(long, default_value = "30")]
    idle_timeout_secs: u64,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();

    let config = ServerConfig {
        confetti_ttl: Duration::from_secs(args.confetti_ttl_secs),
        sweep_interval: Duration::from_millis(args.sweep_interval_ms.max(1)),
        heartbeat: Heartbeat {
            interval: Duration::from_secs(args.heartbeat_secs.max(1)),
            idle_timeout: Duration::from_secs(args.idle_timeout_secs.max(1)),
        },
    };
    let server = Server::new(InMemoryRealtimeStore::new(), config);
    if let Err(e) = server.run(args.host, args.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
