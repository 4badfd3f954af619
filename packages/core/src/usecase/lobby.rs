//! UseCase: ルームの作成と参加

use std::sync::Arc;
use std::time::Duration;

use super::error::SessionError;
use crate::domain::{RealtimeStore, Room, RoomId, RoomPaths, StoreError, Timestamp, User, UserId, UserName};
use crate::infrastructure::dto::conversion::to_store_value;
use crate::infrastructure::dto::room::{RoomDocument, UserDocument};

/// ストアが最初のスナップショットを返すまで待つ時間の既定値
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RoomLobby {
    store: Arc<dyn RealtimeStore>,
    lookup_timeout: Duration,
}

impl RoomLobby {
    pub fn new(store: Arc<dyn RealtimeStore>) -> Self {
        Self {
            store,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    pub fn with_lookup_timeout(mut self, lookup_timeout: Duration) -> Self {
        self.lookup_timeout = lookup_timeout;
        self
    }

    /// 新しいルームのドキュメント全体を書き込む
    ///
    /// 同じ ID のルームが既にあれば上書きされる（ID の衝突は考慮しない）。
    pub async fn create_room(
        &self,
        room_id: &RoomId,
        owner_id: &UserId,
        owner_name: UserName,
    ) -> Result<(), StoreError> {
        let room = Room::new(
            room_id.clone(),
            owner_id.clone(),
            owner_name,
            Timestamp::default(),
        );
        let value = to_store_value(&RoomDocument::from(&room))?;

        self.store
            .write(RoomPaths::new(room_id).room(), value)
            .await?;
        tracing::info!("Room '{}' created by '{}'", room_id, owner_id);
        Ok(())
    }

    /// 参加者としてユーザーを書き込む。同じ ID で参加し直すと前の内容は上書きされる
    pub async fn join_room(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        name: UserName,
    ) -> Result<(), StoreError> {
        let user = User::participant(user_id.clone(), name);
        let value = to_store_value(&UserDocument::from(&user))?;

        self.store
            .write(&RoomPaths::new(room_id).user(user_id), value)
            .await?;
        tracing::info!("User '{}' joined room '{}'", user_id, room_id);
        Ok(())
    }

    /// ルームが存在するかを、購読の最初のスナップショットで確かめる
    pub async fn room_exists(&self, room_id: &RoomId) -> Result<bool, SessionError> {
        let mut subscription = self
            .store
            .subscribe(RoomPaths::new(room_id).room())
            .await?;

        match tokio::time::timeout(self.lookup_timeout, subscription.next()).await {
            Ok(Some(snapshot)) => Ok(snapshot.exists()),
            Ok(None) => Err(SessionError::Store(StoreError::Unavailable)),
            Err(_) => Err(SessionError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StorePath;
    use crate::infrastructure::store::InMemoryRealtimeStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_then_join() {
        // テスト項目: 作成したルームに参加すると、ユーザーが 2 人になりオーナーは 1 人のまま
        // given (前提条件):
        let store = InMemoryRealtimeStore::new();
        let lobby = RoomLobby::new(Arc::new(store.connect()));
        let room_id = RoomId::try_from("r1").unwrap();

        // when (操作):
        lobby
            .create_room(&room_id, &UserId::try_from("u1").unwrap(), UserName::new("Alice".to_string()).unwrap())
            .await
            .unwrap();
        lobby
            .join_room(&room_id, &UserId::try_from("u2").unwrap(), UserName::new("Bob".to_string()).unwrap())
            .await
            .unwrap();

        // then (期待する結果):
        let room = store.get(&StorePath::parse("rooms/r1").unwrap()).await.unwrap();
        assert_eq!(room["users"].as_object().unwrap().len(), 2);
        assert_eq!(room["users"]["u1"]["isOwner"], json!(true));
        assert_eq!(room["users"]["u2"]["isOwner"], json!(false));
        assert_eq!(room["users"]["u2"]["isOnline"], json!(true));
        assert_eq!(room["users"]["u2"]["group"], json!("default"));
        assert!(room["groups"]["default"]["timestamp"].is_i64());
        assert!(lobby.room_exists(&room_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_room_exists_for_missing_room() {
        // テスト項目: 存在しないルームは false になる
        // given (前提条件):
        let store = InMemoryRealtimeStore::new();
        let lobby = RoomLobby::new(Arc::new(store.connect()));

        // when (操作):
        let exists = lobby
            .room_exists(&RoomId::try_from("nope").unwrap())
            .await
            .unwrap();

        // then (期待する結果):
        assert!(!exists);
    }
}
