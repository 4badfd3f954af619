//! UseCase: 紙吹雪イベント
//!
//! - `CelebrationBus`: イベントを `confetti/{eventId}` に書き込み、一定時間後に自分で削除する
//! - `CelebrationFeed`: 届いた `confetti` マップから未表示のイベントだけを取り出す
//!
//! 配送はベストエフォート（少なくとも一度、順序保証なし）で、重複は ID で取り除く。

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use super::error::{CommandOutcome, CommandSkip};
use crate::domain::{
    ConfettiEvent, ConfettiId, ConfettiLaunch, RealtimeStore, RoomId, RoomPaths, StoreError,
};
use crate::infrastructure::dto::conversion::to_store_value;
use crate::infrastructure::dto::room::ConfettiDocument;

/// 発行者がイベントを削除するまでの時間
pub const CONFETTI_LIFETIME: Duration = Duration::from_secs(5);

/// 表示済みとして覚えておくイベント ID の数
pub const SEEN_CONFETTI_CAPACITY: usize = 25;

#[derive(Clone)]
pub struct CelebrationBus {
    store: Arc<dyn RealtimeStore>,
    paths: RoomPaths,
    lifetime: Duration,
}

impl CelebrationBus {
    pub fn new(store: Arc<dyn RealtimeStore>, room_id: &RoomId) -> Self {
        Self {
            store,
            paths: RoomPaths::new(room_id),
            lifetime: CONFETTI_LIFETIME,
        }
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// イベントを発行し、`lifetime` 後の削除を予約する
    ///
    /// 削除はこのプロセスが生きている間だけ行われる。発行者が先にいなくなった
    /// イベントはサーバー側の期限切れ処理で消える。
    pub async fn publish(&self, launch: ConfettiLaunch) -> CommandOutcome<ConfettiId> {
        let event = ConfettiEvent::new(ConfettiId::generate(), launch);
        let path = self.paths.confetti_event(&event.id);

        let written = match to_store_value(&ConfettiDocument::from(&event)) {
            Ok(value) => self.store.write(&path, value).await,
            Err(e) => Err(StoreError::from(e)),
        };
        if let Err(e) = written {
            tracing::warn!("Failed to publish confetti {}: {}", event.id, e);
            return CommandOutcome::Skipped(CommandSkip::Store(e));
        }
        tracing::debug!("Published confetti {}", event.id);

        let store = self.store.clone();
        let lifetime = self.lifetime;
        tokio::spawn(async move {
            tokio::time::sleep(lifetime).await;
            if let Err(e) = store.remove(&path).await {
                tracing::debug!("Could not remove confetti at {}: {}", path, e);
            }
        });

        CommandOutcome::Dispatched(event.id)
    }
}

/// 表示済みイベントの記録
pub struct CelebrationFeed {
    seen: VecDeque<ConfettiId>,
    capacity: usize,
}

impl Default for CelebrationFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl CelebrationFeed {
    pub fn new() -> Self {
        Self::with_capacity(SEEN_CONFETTI_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn has_seen(&self, id: &ConfettiId) -> bool {
        self.seen.contains(id)
    }

    /// 未表示のイベントを作成時刻順に返し、表示済みとして記録する
    pub fn ingest<'a>(
        &mut self,
        events: impl IntoIterator<Item = &'a ConfettiEvent>,
    ) -> Vec<ConfettiEvent> {
        let mut fresh: Vec<ConfettiEvent> = events
            .into_iter()
            .filter(|event| !self.has_seen(&event.id))
            .cloned()
            .collect();
        fresh.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        for event in &fresh {
            self.seen.push_back(event.id.clone());
            if self.seen.len() > self.capacity {
                self.seen.pop_front();
            }
        }
        fresh
    }
}
