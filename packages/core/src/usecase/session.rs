//! UseCase: 1 参加者分のルームセッション
//!
//! ルームの作成・参加から、スナップショットの監視、プレゼンス管理、
//! 合意検出、紙吹雪の受信までをまとめて起動し、結果を `SessionEvent` として通知する。
//!
//! ```text
//! store ──snapshot──▶ RoomWatcher ──▶ ConsensusDetector ──▶ SessionEvent::Celebrate
//!                          │      └─▶ CelebrationFeed   ──▶ SessionEvent::Celebrate
//!                          └─watch─▶ RoomCommands
//! connection_state ──▶ PresenceTracker / SessionEvent::ConnectionChanged
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::celebration::{CONFETTI_LIFETIME, CelebrationBus, CelebrationFeed};
use super::consensus::{Consensus, ConsensusDetector};
use super::error::{CommandOutcome, CommandSkip, SessionError};
use super::lobby::{DEFAULT_LOOKUP_TIMEOUT, RoomLobby};
use super::presence::PresenceTracker;
use super::room_commands::RoomCommands;
use super::room_watcher::{RoomSnapshot, RoomWatcher};
use crate::domain::{
    ConfettiEvent, ConfettiId, ConfettiLaunch, ConnectionState, RealtimeStore, Room, RoomId,
    UserId, UserName,
};

/// 表示すべき祝福
#[derive(Debug, Clone, PartialEq)]
pub enum Celebration {
    /// 自分のグループで合意した（このクライアントだけで表示する）
    Consensus(Consensus),
    /// 誰かが発行した紙吹雪
    Confetti(ConfettiEvent),
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    RoomUpdated(Arc<Room>),
    /// ルームがストアから消えた
    RoomMissing,
    Celebrate(Celebration),
    ConnectionChanged(ConnectionState),
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub confetti_lifetime: Duration,
    pub lookup_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            confetti_lifetime: CONFETTI_LIFETIME,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }
}

pub struct RoomSession {
    room_id: RoomId,
    user_id: UserId,
    commands: RoomCommands,
    celebrations: CelebrationBus,
    snapshot: watch::Receiver<RoomSnapshot>,
    tasks: Vec<JoinHandle<()>>,
}

impl RoomSession {
    /// 新しいルームを作成してセッションを開始
    pub async fn create(
        store: Arc<dyn RealtimeStore>,
        room_id: RoomId,
        owner_id: UserId,
        owner_name: UserName,
        options: SessionOptions,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>), SessionError> {
        RoomLobby::new(store.clone())
            .create_room(&room_id, &owner_id, owner_name)
            .await?;
        let watcher = RoomWatcher::start(store.as_ref(), &room_id).await?;

        Ok(Self::start(store, watcher, owner_id, options))
    }

    /// 既存のルームに参加してセッションを開始
    ///
    /// ルームが存在しなければ `SessionError::RoomNotFound` を返し、何も書き込まない。
    pub async fn join(
        store: Arc<dyn RealtimeStore>,
        room_id: RoomId,
        user_id: UserId,
        name: UserName,
        options: SessionOptions,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>), SessionError> {
        let lobby = RoomLobby::new(store.clone()).with_lookup_timeout(options.lookup_timeout);
        if !lobby.room_exists(&room_id).await? {
            return Err(SessionError::RoomNotFound(room_id));
        }
        lobby.join_room(&room_id, &user_id, name).await?;
        let watcher = RoomWatcher::start(store.as_ref(), &room_id).await?;

        Ok(Self::start(store, watcher, user_id, options))
    }

    fn start(
        store: Arc<dyn RealtimeStore>,
        watcher: RoomWatcher,
        user_id: UserId,
        options: SessionOptions,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let room_id = watcher.room_id().clone();
        let snapshot = watcher.snapshots();
        let (events, receiver) = mpsc::unbounded_channel();

        let presence = PresenceTracker::new(store.clone(), &room_id, &user_id);
        let presence_task = tokio::spawn(presence.run(store.connection_state()));

        let connection_task = tokio::spawn(forward_connection_state(
            store.connection_state(),
            events.clone(),
        ));
        let snapshot_task = tokio::spawn(run_snapshot_loop(
            watcher,
            ConsensusDetector::new(user_id.clone()),
            CelebrationFeed::new(),
            events,
        ));

        let session = Self {
            commands: RoomCommands::new(store.clone(), &room_id, snapshot.clone()),
            celebrations: CelebrationBus::new(store, &room_id)
                .with_lifetime(options.confetti_lifetime),
            room_id,
            user_id,
            snapshot,
            tasks: vec![presence_task, connection_task, snapshot_task],
        };
        (session, receiver)
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn commands(&self) -> &RoomCommands {
        &self.commands
    }

    /// 最新のスナップショット
    pub fn snapshot(&self) -> RoomSnapshot {
        self.snapshot.borrow().clone()
    }

    /// 紙吹雪をルーム全体に発行
    ///
    /// ルームが読み込まれていない、または消えている間は何も書き込まない。
    pub async fn publish_celebration(&self, launch: ConfettiLaunch) -> CommandOutcome<ConfettiId> {
        let skip = match &*self.snapshot.borrow() {
            RoomSnapshot::Loaded(_) => None,
            RoomSnapshot::NotLoaded => Some(CommandSkip::NotLoaded),
            RoomSnapshot::Missing => Some(CommandSkip::RoomMissing),
        };
        if let Some(reason) = skip {
            return CommandOutcome::Skipped(reason);
        }
        self.celebrations.publish(launch).await
    }

    /// バックグラウンドタスクを止める（ストアへの接続自体は閉じない）
    pub fn close(mut self) {
        self.abort_tasks();
    }

    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

async fn run_snapshot_loop(
    mut watcher: RoomWatcher,
    mut detector: ConsensusDetector,
    mut feed: CelebrationFeed,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    while let Some(snapshot) = watcher.next().await {
        let mut outgoing = Vec::new();
        match snapshot {
            RoomSnapshot::Loaded(room) => {
                outgoing.push(SessionEvent::RoomUpdated(room.clone()));
                if let Some(consensus) = detector.observe(&room) {
                    outgoing.push(SessionEvent::Celebrate(Celebration::Consensus(consensus)));
                }
                for event in feed.ingest(room.confetti.values()) {
                    outgoing.push(SessionEvent::Celebrate(Celebration::Confetti(event)));
                }
            }
            RoomSnapshot::Missing => {
                tracing::warn!("Room '{}' no longer exists", watcher.room_id());
                detector.reset();
                outgoing.push(SessionEvent::RoomMissing);
            }
            RoomSnapshot::NotLoaded => {}
        }

        for event in outgoing {
            if events.send(event).is_err() {
                return;
            }
        }
    }
    tracing::debug!("Room subscription ended");
}

async fn forward_connection_state(
    mut state: watch::Receiver<ConnectionState>,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    while state.changed().await.is_ok() {
        let current = *state.borrow_and_update();
        if events.send(SessionEvent::ConnectionChanged(current)).is_err() {
            return;
        }
    }
}
