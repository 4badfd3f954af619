//! Realtime store implementations.

pub mod expiry;
pub mod memory;
pub mod tree;

pub use expiry::ConfettiExpirySweeper;
pub use memory::{InMemoryConnection, InMemoryRealtimeStore};
pub use tree::DocumentTree;
