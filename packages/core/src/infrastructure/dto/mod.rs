//! Data Transfer Objects (DTOs).
//!
//! DTOs are organized by boundary:
//! - `room`: documents stored under `rooms/{roomId}` (the versioned schema)
//! - `wire`: WebSocket frames between a client and the store host

pub mod conversion;
pub mod room;
pub mod wire;

pub use conversion::{SchemaError, decode_room};
