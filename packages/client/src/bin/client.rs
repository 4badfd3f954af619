//! Hanabi planning poker client.
//!
//! Creates a new room (or joins one with `--room`) and reads commands from stdin.
//! Automatically reconnects on disconnection (max 5 attempts with 5 second interval).
//!
//! Run with:
//! ```not_rust
//! cargo run --bin hanabi-client -- --name Alice
//! cargo run --bin hanabi-client -- --name Bob --room <room id>
//! ```

use clap::Parser;
use hanabi_client::{ClientOptions, error::ClientError, run_client};
use hanabi_core::domain::{RoomId, UserId, UserName};
use hanabi_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "hanabi-client")]
#[command(about = "Planning poker client for Hanabi", long_about = None)]
struct Args {
    /// Display name in the room
    #[arg(short = 'n', long)]
    name: String,

    /// Room ID to join (omit to create a new room)
    #[arg(short = 'r', long)]
    room: Option<String>,

    /// User ID (defaults to a freshly generated one)
    #[arg(long)]
    user_id: Option<String>,

    /// WebSocket server URL
    #[arg(short = 'u', long, default_value = "ws://127.0.0.1:8080/ws")]
    url: String,

    /// Do not print consensus and confetti celebrations
    #[arg(long)]
    no_confetti: bool,
}

impl TryFrom<Args> for ClientOptions {
    type Error = ClientError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        Ok(Self {
            url: args.url,
            name: UserName::new(args.name)?,
            room: args.room.map(RoomId::new).transpose()?,
            user_id: match args.user_id {
                Some(user_id) => UserId::new(user_id)?,
                None => UserId::generate(),
            },
            show_celebrations: !args.no_confetti,
        })
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    let result = match ClientOptions::try_from(args) {
        Ok(options) => run_client(options).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
