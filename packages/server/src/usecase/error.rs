//! UseCase 層のエラー型定義

use hanabi_core::domain::{StoreError, ValueObjectError};
use thiserror::Error;

/// クライアントフレームの適用エラー（クライアントには error フレームとして返す）
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// ルーム取得のエラー
#[derive(Debug, Error, PartialEq)]
pub enum GetRoomError {
    #[error("invalid room id: {0}")]
    InvalidRoomId(#[from] ValueObjectError),

    #[error("room not found")]
    RoomNotFound,
}
