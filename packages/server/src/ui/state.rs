//! Server state.

use std::sync::Arc;
use std::time::Duration;

use hanabi_core::infrastructure::store::InMemoryRealtimeStore;

use crate::usecase::GetRoomUseCase;

/// 接続の死活監視の設定
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Heartbeat {
    /// Ping を送る間隔
    pub interval: Duration,
    /// 何も受信しないまま経過したら接続を切るまでの時間
    pub idle_timeout: Duration,
}

/// Shared application state
pub struct AppState {
    /// 全クライアントが共有するストア（WebSocket 接続ごとに `connect()` する）
    pub store: InMemoryRealtimeStore,
    /// GetRoomUseCase（ルーム取得のユースケース）
    pub get_room_usecase: Arc<GetRoomUseCase>,
    pub heartbeat: Heartbeat,
}

impl AppState {
    pub fn new(store: InMemoryRealtimeStore, heartbeat: Heartbeat) -> Self {
        Self {
            get_room_usecase: Arc::new(GetRoomUseCase::new(store.clone())),
            store,
            heartbeat,
        }
    }
}
