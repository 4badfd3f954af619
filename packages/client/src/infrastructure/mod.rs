//! Infrastructure 層
//!
//! hanabi-server に接続する `RealtimeStore` の実装を提供します。

pub mod websocket_store;

pub use websocket_store::{ReconnectPolicy, WebSocketRealtimeStore};
