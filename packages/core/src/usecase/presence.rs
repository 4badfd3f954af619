//! UseCase: プレゼンス管理
//!
//! ストアへの接続が確立するたびに、
//!
//! 1. 自分の `isOnline` に「切断時に `false` を書く」フックを登録し、
//! 2. 直後に `true` を書き込む。
//!
//! フックは切断で消費されるため、再接続のたびに登録し直す。接続状態は
//! `watch` で受け取るので途中の遷移は間引かれることがあるが、`Connected` の
//! セッション番号が変わっていれば再登録する。

use std::sync::Arc;

use serde_json::json;
use tokio::sync::watch;

use crate::domain::{ConnectionState, RealtimeStore, RoomId, RoomPaths, StoreError, StorePath, UserId};

pub struct PresenceTracker {
    store: Arc<dyn RealtimeStore>,
    presence_path: StorePath,
}

impl PresenceTracker {
    pub fn new(store: Arc<dyn RealtimeStore>, room_id: &RoomId, user_id: &UserId) -> Self {
        Self {
            store,
            presence_path: RoomPaths::new(room_id).user_presence(user_id),
        }
    }

    /// 切断フックを登録してからオンラインを書き込む
    pub async fn arm(&self) -> Result<(), StoreError> {
        self.store
            .on_disconnect_write(&self.presence_path, json!(false))
            .await?;
        self.store.write(&self.presence_path, json!(true)).await
    }

    /// 接続状態を監視し、新しい接続ごとに `arm` する
    ///
    /// 接続状態のチャンネルが閉じると終了する。
    pub async fn run(self, mut state: watch::Receiver<ConnectionState>) {
        let mut armed_session = None;

        loop {
            let current = *state.borrow_and_update();
            if let ConnectionState::Connected { session } = current
                && armed_session != Some(session)
            {
                match self.arm().await {
                    Ok(()) => {
                        tracing::debug!("Presence armed at {} (session {})", self.presence_path, session);
                        armed_session = Some(session);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to arm presence at {}: {}", self.presence_path, e);
                    }
                }
            }

            if state.changed().await.is_err() {
                tracing::debug!("Connection state closed, presence tracker stopped");
                break;
            }
        }
    }
}
