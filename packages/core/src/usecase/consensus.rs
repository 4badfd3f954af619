//! UseCase: 合意検出
//!
//! 公開フラグが `false` から `true` に変わった瞬間だけ合意を判定する
//! （エッジトリガー）。`true` のまま届くスナップショットでは再判定しない。
//! 検出器が最初に見たスナップショットは状態を覚えるだけで、判定はしない。

use crate::domain::{GroupId, Room, UserId, Vote, unanimous_vote};

/// 検出された合意
#[derive(Debug, Clone, PartialEq)]
pub struct Consensus {
    pub group_id: GroupId,
    pub vote: Vote,
    /// 合意した（投票済みでオンラインの）メンバー数
    pub voters: usize,
}

pub struct ConsensusDetector {
    local_user: UserId,
    last_show: Option<bool>,
}

impl ConsensusDetector {
    pub fn new(local_user: UserId) -> Self {
        Self {
            local_user,
            last_show: None,
        }
    }

    /// スナップショットを 1 件処理し、公開の瞬間に合意していればそれを返す
    pub fn observe(&mut self, room: &Room) -> Option<Consensus> {
        let previous = self.last_show.replace(room.show);
        if !room.show || previous != Some(false) {
            return None;
        }

        let vote = unanimous_vote(room, &self.local_user)?;
        let user = room.user(&self.local_user)?;
        let group_id = room.effective_group(user);
        let voters = room
            .online_members_of(&group_id)
            .into_iter()
            .filter(|member| member.has_voted())
            .count();

        tracing::info!(
            "Consensus in group '{}' on {} ({} voter(s))",
            group_id,
            vote,
            voters
        );
        Some(Consensus {
            group_id,
            vote,
            voters,
        })
    }

    /// 状態を忘れる（ルームが消えたときなど）。次のスナップショットは再び判定せずに覚えるだけになる。
    pub fn reset(&mut self) {
        self.last_show = None;
    }
}
