//! UseCase 層
//!
//! WebSocket から届いたフレームのストアへの適用と、HTTP API 向けのルーム取得を提供します。

pub mod error;
pub mod get_room;
pub mod store_session;

pub use error::{FrameError, GetRoomError};
pub use get_room::GetRoomUseCase;
pub use store_session::StoreSession;
