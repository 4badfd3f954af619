//! Domain 層
//!
//! ルーム・グループ・ユーザー・紙吹雪イベントのモデルと、
//! ドメインが必要とするリアルタイムストアのインターフェースを定義します。
//! 具体的なストアの実装は Infrastructure 層が提供します（依存性の逆転）。

pub mod consensus;
pub mod entity;
pub mod error;
pub mod paths;
pub mod store;
pub mod value_object;

pub use consensus::unanimous_vote;
pub use entity::{ConfettiBurst, ConfettiEvent, ConfettiLaunch, Group, Position, Room, User};
pub use error::{StoreError, ValueObjectError};
pub use paths::RoomPaths;
pub use store::{
    ConnectionState, RealtimeStore, Snapshot, StorePath, Subscription, is_server_timestamp,
    server_timestamp,
};
pub use value_object::{ConfettiId, GroupId, GroupName, RoomId, Timestamp, UserId, UserName, Vote};

#[cfg(test)]
pub use store::MockRealtimeStore;
