//! Infrastructure 層
//!
//! ドメイン層が定義する `RealtimeStore` の実装と、ストア上のドキュメント・
//! WebSocket のフレームを表す DTO を提供します。

pub mod dto;
pub mod store;
