//! Room and event formatting for client display.

use hanabi_core::domain::{ConfettiEvent, ConnectionState, Room, UserId};
use hanabi_core::usecase::{CommandSkip, Consensus};
use hanabi_shared::time::timestamp_to_rfc3339;

const RULE: &str = "============================================================";

/// Formatter for the terminal view of a room
pub struct RoomFormatter;

impl RoomFormatter {
    /// Format a room snapshot: groups in display order with their online
    /// members and what everyone can see of their votes
    ///
    /// # Arguments
    ///
    /// * `room` - The latest room snapshot
    /// * `me` - The local user (marked as "me")
    pub fn format_room(room: &Room, me: &UserId) -> String {
        let mut output = String::new();
        output.push_str(&format!("\n\n{}\n", RULE));
        output.push_str(&format!("{} (room id: {})\n", room.title(), room.id));
        output.push_str(if room.show {
            "Votes: revealed\n"
        } else {
            "Votes: hidden\n"
        });

        for group in room.groups_in_display_order() {
            output.push_str(&format!("\n[{}] ({})\n", group.name, group.id));

            let members = room.online_members_of(&group.id);
            if members.is_empty() {
                output.push_str("  (nobody online)\n");
            }
            for member in members {
                let me_suffix = if &member.id == me { " (me)" } else { "" };
                let owner_suffix = if member.is_owner { " *" } else { "" };
                let vote = member.visible_vote(room.show);
                let vote = if vote.is_empty() { "-" } else { vote };
                output.push_str(&format!(
                    "  {}{}{}: {}\n",
                    member.name, owner_suffix, me_suffix, vote
                ));
            }
        }

        let offline = room.users.values().filter(|user| !user.is_online).count();
        if offline > 0 {
            output.push_str(&format!("\n{} offline\n", offline));
        }
        output.push_str(RULE);
        output.push('\n');
        output
    }

    /// Format the local consensus celebration
    pub fn format_consensus(consensus: &Consensus, room: Option<&Room>) -> String {
        let group = room
            .and_then(|room| room.group(&consensus.group_id))
            .map(|group| group.name.to_string())
            .unwrap_or_else(|| consensus.group_id.to_string());
        format!(
            "\n*** Consensus in {}: {} voter(s) agreed on {} ***\n",
            group, consensus.voters, consensus.vote
        )
    }

    /// Format a confetti burst published by any participant
    pub fn format_confetti(event: &ConfettiEvent) -> String {
        let burst = event.burst();
        let mut output = format!(
            "\n* * * Confetti! angle {:.0}, spread {:.0}, velocity {:.0} from ({:.2}, {:.2})",
            burst.angle, burst.spread, burst.start_velocity, burst.origin.x, burst.origin.y
        );
        if let Some(created_at) = event.created_at {
            output.push_str(&format!(" at {}", timestamp_to_rfc3339(created_at.value())));
        }
        output.push_str(" * * *\n");
        output
    }

    pub fn format_connection(state: ConnectionState) -> String {
        match state {
            ConnectionState::Connected { session } if session > 1 => {
                "\n(reconnected)\n".to_string()
            }
            ConnectionState::Connected { .. } => "\n(connected)\n".to_string(),
            ConnectionState::Connecting => "\n(reconnecting...)\n".to_string(),
            ConnectionState::Disconnected => "\n(offline)\n".to_string(),
        }
    }

    pub fn format_room_missing() -> String {
        "\nThe room no longer exists.\n".to_string()
    }

    /// Format why a command did not write anything
    pub fn format_skip(reason: &CommandSkip) -> String {
        format!("Nothing changed: {}\n", reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hanabi_core::domain::{
        ConfettiId, ConfettiLaunch, Group, GroupId, GroupName, RoomId, Timestamp, User, UserName,
        Vote,
    };

    fn create_room() -> Room {
        let mut room = Room::new(
            RoomId::try_from("r1").unwrap(),
            UserId::try_from("u1").unwrap(),
            UserName::new("Alice".to_string()).unwrap(),
            Timestamp::new(1000),
        );
        let mut bob = User::participant(
            UserId::try_from("u2").unwrap(),
            UserName::new("Bob".to_string()).unwrap(),
        );
        bob.vote = Some(Vote::Thirteen);
        room.users.insert(bob.id.clone(), bob);
        room.groups.insert(
            GroupId::try_from("g1").unwrap(),
            Group {
                id: GroupId::try_from("g1").unwrap(),
                name: GroupName::new("Backend".to_string()).unwrap(),
                timestamp: Timestamp::new(2000),
            },
        );
        room
    }

    #[test]
    fn test_format_room_hides_votes_until_revealed() {
        // テスト項目: 公開前は投票済みのユーザーが "?"、未投票が "-" で表示される
        // given (前提条件):
        let room = create_room();

        // when (操作):
        let result = RoomFormatter::format_room(&room, &UserId::try_from("u1").unwrap());

        // then (期待する結果):
        assert!(result.contains("Alice's room (room id: r1)"));
        assert!(result.contains("Votes: hidden"));
        assert!(result.contains("Alice * (me): -"));
        assert!(result.contains("Bob: ?"));
        assert!(!result.contains("12 + 1"));
    }

    #[test]
    fn test_format_room_shows_labels_and_group_order() {
        // テスト項目: 公開後はカードの表示名が出て、グループは作成順に並ぶ
        // given (前提条件):
        let mut room = create_room();
        room.show = true;

        // when (操作):
        let result = RoomFormatter::format_room(&room, &UserId::try_from("u2").unwrap());

        // then (期待する結果):
        assert!(result.contains("Bob (me): 12 + 1"));
        let users = result.find("[Users] (default)").unwrap();
        let backend = result.find("[Backend] (g1)").unwrap();
        assert!(users < backend);
        assert!(result.contains("(nobody online)"));
    }

    #[test]
    fn test_format_room_counts_offline_users() {
        // テスト項目: オフラインのユーザーはグループに表示されず、人数だけが表示される
        // given (前提条件):
        let mut room = create_room();
        if let Some(bob) = room.users.get_mut(&UserId::try_from("u2").unwrap()) {
            bob.is_online = false;
        }

        // when (操作):
        let result = RoomFormatter::format_room(&room, &UserId::try_from("u1").unwrap());

        // then (期待する結果):
        assert!(!result.contains("Bob"));
        assert!(result.contains("1 offline"));
    }

    #[test]
    fn test_format_consensus_uses_group_name() {
        // テスト項目: 合意の通知にはグループの表示名と合意したカードが含まれる
        // given (前提条件):
        let room = create_room();
        let consensus = Consensus {
            group_id: GroupId::default_group(),
            vote: Vote::Five,
            voters: 2,
        };

        // when (操作):
        let result = RoomFormatter::format_consensus(&consensus, Some(&room));

        // then (期待する結果):
        assert!(result.contains("Consensus in Users"));
        assert!(result.contains("2 voter(s) agreed on 5"));
    }

    #[test]
    fn test_format_confetti_mirrors_angle() {
        // テスト項目: 紙吹雪の表示は描画用に反転した角度と作成時刻を含む
        // given (前提条件):
        let mut event = ConfettiEvent::new(
            ConfettiId::try_from("c1").unwrap(),
            ConfettiLaunch::default(),
        );
        event.created_at = Some(Timestamp::new(1672531200000));

        // when (操作):
        let result = RoomFormatter::format_confetti(&event);

        // then (期待する結果):
        assert!(result.contains("angle 90"));
        assert!(result.contains("spread 45"));
        assert!(result.contains("from (0.50, 1.00)"));
        assert!(result.contains("2023-01-01"));
    }

    #[test]
    fn test_format_connection_states() {
        // テスト項目: 接続状態ごとに表示が変わり、2 回目以降の接続は再接続として表示される
        // then (期待する結果):
        assert!(RoomFormatter::format_connection(ConnectionState::Connected { session: 1 }).contains("connected"));
        assert!(RoomFormatter::format_connection(ConnectionState::Connected { session: 2 }).contains("reconnected"));
        assert!(RoomFormatter::format_connection(ConnectionState::Disconnected).contains("offline"));
    }

    #[test]
    fn test_format_skip() {
        // テスト項目: スキップ理由が表示される
        // then (期待する結果):
        assert_eq!(
            RoomFormatter::format_skip(&CommandSkip::ProtectedGroup),
            "Nothing changed: the default group cannot be deleted\n"
        );
    }
}
