//! WebSocket store host implementation.

mod handler;
mod server;
mod signal;
pub mod state;

pub use server::{Server, ServerConfig};
pub use state::Heartbeat;
