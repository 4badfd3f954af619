//! Logical path layout of a room inside the store.
//!
//! ```text
//! rooms/{roomId}                         -> Room
//! rooms/{roomId}/users/{userId}          -> User
//! rooms/{roomId}/users/{userId}/isOnline -> bool   (presence path)
//! rooms/{roomId}/groups/{groupId}        -> Group
//! rooms/{roomId}/confetti/{eventId}      -> ConfettiEvent
//! ```

use super::store::StorePath;
use super::value_object::{ConfettiId, GroupId, RoomId, UserId};

pub const ROOMS: &str = "rooms";

/// Paths of every node belonging to one room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomPaths {
    room: StorePath,
}

impl RoomPaths {
    pub fn new(room_id: &RoomId) -> Self {
        Self {
            room: Self::rooms().child(room_id.as_str()),
        }
    }

    /// Parent of every room
    pub fn rooms() -> StorePath {
        StorePath::root().child(ROOMS)
    }

    pub fn room(&self) -> &StorePath {
        &self.room
    }

    pub fn show(&self) -> StorePath {
        self.room.child("show")
    }

    pub fn users(&self) -> StorePath {
        self.room.child("users")
    }

    pub fn user(&self, user_id: &UserId) -> StorePath {
        self.users().child(user_id.as_str())
    }

    pub fn user_name(&self, user_id: &UserId) -> StorePath {
        self.user(user_id).child("name")
    }

    pub fn user_vote(&self, user_id: &UserId) -> StorePath {
        self.user(user_id).child("vote")
    }

    pub fn user_group(&self, user_id: &UserId) -> StorePath {
        self.user(user_id).child("group")
    }

    /// Presence flag owned by the presence tracker
    pub fn user_presence(&self, user_id: &UserId) -> StorePath {
        self.user(user_id).child("isOnline")
    }

    pub fn groups(&self) -> StorePath {
        self.room.child("groups")
    }

    pub fn group(&self, group_id: &GroupId) -> StorePath {
        self.groups().child(group_id.as_str())
    }

    pub fn group_name(&self, group_id: &GroupId) -> StorePath {
        self.group(group_id).child("name")
    }

    pub fn confetti(&self) -> StorePath {
        self.room.child("confetti")
    }

    pub fn confetti_event(&self, confetti_id: &ConfettiId) -> StorePath {
        self.confetti().child(confetti_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_paths_layout() {
        // テスト項目: ルーム配下のパスが決められたレイアウトで組み立てられる
        // given (前提条件):
        let paths = RoomPaths::new(&RoomId::try_from("r1").unwrap());
        let user_id = UserId::try_from("u1").unwrap();
        let group_id = GroupId::try_from("g1").unwrap();
        let confetti_id = ConfettiId::try_from("c1").unwrap();

        // then (期待する結果):
        assert_eq!(paths.room().to_string(), "rooms/r1");
        assert_eq!(paths.show().to_string(), "rooms/r1/show");
        assert_eq!(paths.user_presence(&user_id).to_string(), "rooms/r1/users/u1/isOnline");
        assert_eq!(paths.user_vote(&user_id).to_string(), "rooms/r1/users/u1/vote");
        assert_eq!(paths.group_name(&group_id).to_string(), "rooms/r1/groups/g1/name");
        assert_eq!(paths.confetti_event(&confetti_id).to_string(), "rooms/r1/confetti/c1");
    }
}
