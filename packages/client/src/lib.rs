//! Interactive planning poker client for Hanabi.
//!
//! Connects to a hanabi-server over WebSocket, creates or joins a room and
//! drives the room commands from a line based terminal UI.

pub mod command;
pub mod error;
pub mod formatter;
pub mod infrastructure;
pub mod runner;
mod ui;

pub use runner::{ClientOptions, run_client};
