//! UseCase: ルームドキュメントの取得

use hanabi_core::domain::{RoomId, RoomPaths};
use hanabi_core::infrastructure::store::InMemoryRealtimeStore;
use serde_json::Value;

use super::error::GetRoomError;

/// ルーム取得のユースケース
pub struct GetRoomUseCase {
    store: InMemoryRealtimeStore,
}

impl GetRoomUseCase {
    pub fn new(store: InMemoryRealtimeStore) -> Self {
        Self { store }
    }

    /// ストアに保存されているルームドキュメントをそのまま返す
    pub async fn execute(&self, room_id: String) -> Result<Value, GetRoomError> {
        let room_id = RoomId::try_from(room_id)?;
        self.store
            .get(RoomPaths::new(&room_id).room())
            .await
            .ok_or(GetRoomError::RoomNotFound)
    }
}
