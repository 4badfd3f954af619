//! UseCase: ルームのスナップショット監視
//!
//! ストアのルームパスを購読し、届いた生のスナップショットを検証済みの
//! `Room` に変換する。最新のスナップショットは `watch` チャンネルで
//! コマンド側と共有し、変換済みのスナップショットは 1 件ずつ呼び出し元にも返す
//! （合意検出はスナップショットを取りこぼしてはいけないため、`watch` の値だけに頼らない）。

use std::sync::Arc;

use tokio::sync::watch;

use crate::domain::{RealtimeStore, Room, RoomId, RoomPaths, StoreError, Subscription};
use crate::infrastructure::dto::decode_room;

/// クライアントから見たルームの状態
#[derive(Debug, Clone, Default)]
pub enum RoomSnapshot {
    /// 最初のスナップショットがまだ届いていない
    #[default]
    NotLoaded,
    /// ストアにルームが存在しない
    Missing,
    Loaded(Arc<Room>),
}

impl RoomSnapshot {
    pub fn room(&self) -> Option<&Arc<Room>> {
        match self {
            RoomSnapshot::Loaded(room) => Some(room),
            _ => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, RoomSnapshot::Loaded(_))
    }
}

/// ルームの購読
pub struct RoomWatcher {
    room_id: RoomId,
    subscription: Subscription,
    sender: watch::Sender<RoomSnapshot>,
}

impl RoomWatcher {
    /// ルームの購読を開始
    pub async fn start(store: &dyn RealtimeStore, room_id: &RoomId) -> Result<Self, StoreError> {
        let subscription = store.subscribe(RoomPaths::new(room_id).room()).await?;
        let (sender, _) = watch::channel(RoomSnapshot::NotLoaded);

        Ok(Self {
            room_id: room_id.clone(),
            subscription,
            sender,
        })
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// 最新のスナップショットを受け取るチャンネル
    pub fn snapshots(&self) -> watch::Receiver<RoomSnapshot> {
        self.sender.subscribe()
    }

    /// 次のスナップショットを待つ
    ///
    /// 読めないドキュメントは警告を出して読み飛ばし、直前の状態を維持する。
    /// 購読が終わると `None` を返す。
    pub async fn next(&mut self) -> Option<RoomSnapshot> {
        loop {
            let snapshot = self.subscription.next().await?;

            let decoded = match snapshot.value {
                None => RoomSnapshot::Missing,
                Some(value) => match decode_room(value) {
                    Ok(room) if room.id == self.room_id => RoomSnapshot::Loaded(Arc::new(room)),
                    Ok(room) => {
                        tracing::warn!(
                            "Ignoring snapshot of room '{}' stored under '{}'",
                            room.id,
                            self.room_id
                        );
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!("Ignoring invalid snapshot of room '{}': {}", self.room_id, e);
                        continue;
                    }
                },
            };

            self.sender.send_replace(decoded.clone());
            return Some(decoded);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RealtimeStore, StorePath};
    use crate::infrastructure::store::InMemoryRealtimeStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_watcher_decodes_snapshots() {
        // テスト項目: 存在しないルームは Missing、書き込まれたルームは Loaded として届き、watch にも反映される
        // given (前提条件):
        let store = InMemoryRealtimeStore::new();
        let conn = store.connect();
        let room_id = RoomId::try_from("r1").unwrap();
        let mut watcher = RoomWatcher::start(&conn, &room_id).await.unwrap();
        let snapshots = watcher.snapshots();

        // when (操作):
        let first = watcher.next().await.unwrap();
        conn.write(
            &StorePath::parse("rooms/r1").unwrap(),
            json!({ "id": "r1", "ownerId": "u1", "show": true }),
        )
        .await
        .unwrap();
        let second = watcher.next().await.unwrap();

        // then (期待する結果):
        assert!(matches!(first, RoomSnapshot::Missing));
        assert!(second.room().unwrap().show);
        assert!(snapshots.borrow().is_loaded());
    }

    #[tokio::test]
    async fn test_watcher_skips_invalid_documents() {
        // テスト項目: 読めないドキュメントは読み飛ばされ、直前の状態が維持される
        // given (前提条件):
        let store = InMemoryRealtimeStore::new();
        let conn = store.connect();
        let room_id = RoomId::try_from("r1").unwrap();
        let room_path = StorePath::parse("rooms/r1").unwrap();
        conn.write(&room_path, json!({ "id": "r1", "ownerId": "u1" }))
            .await
            .unwrap();
        let mut watcher = RoomWatcher::start(&conn, &room_id).await.unwrap();
        watcher.next().await.unwrap();

        // when (操作):
        conn.write(&room_path.child("schemaVersion"), json!(99))
            .await
            .unwrap();
        conn.write(&room_path.child("show"), json!(true))
            .await
            .unwrap();
        conn.write(&room_path.child("schemaVersion"), json!(1))
            .await
            .unwrap();
        let next = watcher.next().await.unwrap();

        // then (期待する結果):
        assert!(next.room().unwrap().show);
    }
}
