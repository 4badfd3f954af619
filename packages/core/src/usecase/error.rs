//! UseCase 層のエラー定義

use thiserror::Error;

use crate::domain::{GroupId, RoomId, StoreError, UserId};
use crate::infrastructure::dto::SchemaError;

/// コマンドが書き込みを行わなかった理由
///
/// コマンドはエラーを呼び出し元に返さず、スキップ理由を `CommandOutcome` で伝える。
#[derive(Debug, Error)]
pub enum CommandSkip {
    /// ルームのスナップショットがまだ届いていない（InvalidState）
    #[error("room snapshot is not loaded")]
    NotLoaded,

    /// ルームがストアに存在しない
    #[error("room does not exist")]
    RoomMissing,

    #[error("user '{0}' is not in the room")]
    UserNotFound(UserId),

    #[error("group '{0}' does not exist")]
    GroupNotFound(GroupId),

    #[error("the default group cannot be deleted")]
    ProtectedGroup,

    /// ストアが書き込みを受け付けなかった（StoreUnavailable など）
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// コマンドの実行結果
#[derive(Debug)]
#[must_use]
pub enum CommandOutcome<T = ()> {
    /// 書き込みをストアに渡した（反映は次のスナップショットで観測される）
    Dispatched(T),
    /// 何も書き込まなかった
    Skipped(CommandSkip),
}

impl<T> CommandOutcome<T> {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, CommandOutcome::Dispatched(_))
    }

    pub fn skip_reason(&self) -> Option<&CommandSkip> {
        match self {
            CommandOutcome::Dispatched(_) => None,
            CommandOutcome::Skipped(reason) => Some(reason),
        }
    }

    pub fn into_result(self) -> Result<T, CommandSkip> {
        match self {
            CommandOutcome::Dispatched(value) => Ok(value),
            CommandOutcome::Skipped(reason) => Err(reason),
        }
    }
}

impl<T> From<Result<T, CommandSkip>> for CommandOutcome<T> {
    fn from(result: Result<T, CommandSkip>) -> Self {
        match result {
            Ok(value) => CommandOutcome::Dispatched(value),
            Err(reason) => CommandOutcome::Skipped(reason),
        }
    }
}

/// ルームセッションの開始・維持に関するエラー
#[derive(Debug, Error)]
pub enum SessionError {
    /// 参加しようとしたルームが存在しない
    #[error("room '{0}' does not exist")]
    RoomNotFound(RoomId),

    /// ルームのドキュメントが読めない
    #[error("room document is invalid: {0}")]
    Schema(#[from] SchemaError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// ストアが時間内に応答しなかった
    #[error("timed out waiting for the store")]
    Timeout,
}
