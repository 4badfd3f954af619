//! Consensus rule.
//!
//! Pure function over a room snapshot; the edge-triggered detector that
//! decides *when* to evaluate it lives in the usecase layer.

use super::entity::Room;
use super::value_object::{UserId, Vote};

/// The vote every online member of `local_user`'s group agrees on.
///
/// Members who have not voted are ignored. Returns `None` when the local user
/// is not in the room, when nobody in the group has voted, or when the cast
/// votes differ.
pub fn unanimous_vote(room: &Room, local_user: &UserId) -> Option<Vote> {
    let user = room.user(local_user)?;
    let group_id = room.effective_group(user);

    let mut votes = room
        .members_of(&group_id)
        .filter(|member| member.is_online)
        .filter_map(|member| member.vote);

    let first = votes.next()?;
    votes.all(|vote| vote == first).then_some(first)
}
