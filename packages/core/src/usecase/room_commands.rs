//! UseCase: ルームへのコマンド
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - 各コマンドがストアに発行する書き込み（パスと値）
//! - スナップショット未取得・存在しない ID に対するスキップ
//!
//! ### なぜこのテストが必要か
//! - コマンドはエラーを返さず、不正な状態では何も書き込まないことが前提
//! - 投票のリセットやグループ削除は 1 回のアトミックな更新でなければならない
//!
//! ### どのような状況を想定しているか
//! - 正常系：各コマンドの書き込み内容
//! - 異常系：スナップショット未取得、存在しないユーザー・グループ、デフォルトグループの削除
//! - 異常系：ストアが利用できない

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::watch;

use super::error::{CommandOutcome, CommandSkip};
use super::room_watcher::RoomSnapshot;
use crate::domain::{
    Group, GroupId, GroupName, RealtimeStore, Room, RoomId, RoomPaths, StoreError, StorePath,
    Timestamp, UserId, UserName, Vote,
};
use crate::infrastructure::dto::conversion::{to_store_value, vote_to_value};
use crate::infrastructure::dto::room::GroupDocument;

/// ルームを変更するコマンド群
///
/// すべてのコマンドは最新のスナップショットに対して検証を行い、
/// 書き込みをストアに渡した時点で返る（確認は待たない）。
pub struct RoomCommands {
    store: Arc<dyn RealtimeStore>,
    paths: RoomPaths,
    snapshot: watch::Receiver<RoomSnapshot>,
}

fn outcome<T>(command: &'static str, result: Result<T, CommandSkip>) -> CommandOutcome<T> {
    match &result {
        Ok(_) => tracing::debug!("{} dispatched", command),
        Err(CommandSkip::Store(e)) => tracing::warn!("{} failed: {}", command, e),
        Err(reason) => tracing::info!("{} skipped: {}", command, reason),
    }
    result.into()
}

impl RoomCommands {
    pub fn new(
        store: Arc<dyn RealtimeStore>,
        room_id: &RoomId,
        snapshot: watch::Receiver<RoomSnapshot>,
    ) -> Self {
        Self {
            store,
            paths: RoomPaths::new(room_id),
            snapshot,
        }
    }

    fn loaded_room(&self) -> Result<Arc<Room>, CommandSkip> {
        match &*self.snapshot.borrow() {
            RoomSnapshot::Loaded(room) => Ok(room.clone()),
            RoomSnapshot::NotLoaded => Err(CommandSkip::NotLoaded),
            RoomSnapshot::Missing => Err(CommandSkip::RoomMissing),
        }
    }

    fn require_user(room: &Room, user_id: &UserId) -> Result<(), CommandSkip> {
        room.user(user_id)
            .map(|_| ())
            .ok_or_else(|| CommandSkip::UserNotFound(user_id.clone()))
    }

    fn require_group(room: &Room, group_id: &GroupId) -> Result<(), CommandSkip> {
        room.group(group_id)
            .map(|_| ())
            .ok_or_else(|| CommandSkip::GroupNotFound(group_id.clone()))
    }

    /// 公開フラグを反転
    pub async fn toggle_show(&self) -> CommandOutcome {
        let result = async {
            let room = self.loaded_room()?;
            self.store.write(&self.paths.show(), json!(!room.show)).await?;
            Ok::<_, CommandSkip>(())
        }
        .await;
        outcome("toggle_show", result)
    }

    /// 公開フラグを下ろし、全員の票を 1 回のアトミックな更新で消す
    pub async fn reset_votes(&self) -> CommandOutcome {
        let result = async {
            let room = self.loaded_room()?;

            let mut updates: BTreeMap<StorePath, Option<Value>> =
                BTreeMap::from([(self.paths.show(), Some(json!(false)))]);
            for user_id in room.users.keys() {
                updates.insert(self.paths.user_vote(user_id), None);
            }

            self.store.atomic_multi_write(updates).await?;
            Ok::<_, CommandSkip>(())
        }
        .await;
        outcome("reset_votes", result)
    }

    /// 新しいグループを作成し、その ID を返す
    ///
    /// 名前は作成時点のグループ数から `"Group <n>"` になり、並び順用の時刻はストアが決める。
    pub async fn create_group(&self) -> CommandOutcome<GroupId> {
        let result = async {
            let room = self.loaded_room()?;

            let group = Group {
                id: GroupId::generate(),
                name: GroupName::numbered(room.groups.len()),
                timestamp: Timestamp::default(),
            };
            let value = to_store_value(&GroupDocument::from(&group))
                .map_err(StoreError::from)?;

            self.store.write(&self.paths.group(&group.id), value).await?;
            Ok::<_, CommandSkip>(group.id)
        }
        .await;
        outcome("create_group", result)
    }

    pub async fn rename_group(&self, group_id: &GroupId, name: GroupName) -> CommandOutcome {
        let result = async {
            let room = self.loaded_room()?;
            Self::require_group(&room, group_id)?;

            self.store
                .write(&self.paths.group_name(group_id), json!(name.as_str()))
                .await?;
            Ok::<_, CommandSkip>(())
        }
        .await;
        outcome("rename_group", result)
    }

    /// グループを削除し、そのメンバーをデフォルトグループへ移す（1 回のアトミックな更新）
    ///
    /// デフォルトグループは削除できない。
    pub async fn delete_group(&self, group_id: &GroupId) -> CommandOutcome {
        let result = async {
            if group_id.is_default() {
                return Err(CommandSkip::ProtectedGroup);
            }
            let room = self.loaded_room()?;
            Self::require_group(&room, group_id)?;

            let mut updates: BTreeMap<StorePath, Option<Value>> =
                BTreeMap::from([(self.paths.group(group_id), None)]);
            for member in room.users.values().filter(|user| &user.group == group_id) {
                updates.insert(
                    self.paths.user_group(&member.id),
                    Some(json!(GroupId::DEFAULT)),
                );
            }

            self.store.atomic_multi_write(updates).await?;
            Ok::<_, CommandSkip>(())
        }
        .await;
        outcome("delete_group", result)
    }

    pub async fn set_user_name(&self, user_id: &UserId, name: UserName) -> CommandOutcome {
        let result = async {
            let room = self.loaded_room()?;
            Self::require_user(&room, user_id)?;

            self.store
                .write(&self.paths.user_name(user_id), json!(name.as_str()))
                .await?;
            Ok::<_, CommandSkip>(())
        }
        .await;
        outcome("set_user_name", result)
    }

    /// 票を設定する。`None` で取り消し
    pub async fn set_user_vote(&self, user_id: &UserId, vote: Option<Vote>) -> CommandOutcome {
        let result = async {
            let room = self.loaded_room()?;
            Self::require_user(&room, user_id)?;

            self.store
                .write(&self.paths.user_vote(user_id), vote_to_value(vote))
                .await?;
            Ok::<_, CommandSkip>(())
        }
        .await;
        outcome("set_user_vote", result)
    }

    pub async fn set_user_group(&self, user_id: &UserId, group_id: &GroupId) -> CommandOutcome {
        let result = async {
            let room = self.loaded_room()?;
            Self::require_user(&room, user_id)?;
            Self::require_group(&room, group_id)?;

            self.store
                .write(&self.paths.user_group(user_id), json!(group_id.as_str()))
                .await?;
            Ok::<_, CommandSkip>(())
        }
        .await;
        outcome("set_user_group", result)
    }
}
