//! Entities of the room model.

use std::collections::BTreeMap;

use super::value_object::{
    ConfettiId, GroupId, GroupName, RoomId, Timestamp, UserId, UserName, Vote,
};

/// Room entity, the root aggregate of one estimation session.
///
/// The room is jointly owned by every connected client; a `Room` value is
/// always a snapshot of the shared document and may be stale.
#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    pub id: RoomId,
    /// The user who created the room
    pub owner_id: UserId,
    /// Global reveal flag
    pub show: bool,
    pub users: BTreeMap<UserId, User>,
    /// Always contains the `"default"` group
    pub groups: BTreeMap<GroupId, Group>,
    /// Transient celebration events
    pub confetti: BTreeMap<ConfettiId, ConfettiEvent>,
}

impl Room {
    /// Create the document of a brand new room with its owner as only member.
    pub fn new(id: RoomId, owner_id: UserId, owner_name: UserName, created_at: Timestamp) -> Self {
        let owner = User {
            id: owner_id.clone(),
            name: owner_name,
            is_owner: true,
            is_online: true,
            vote: None,
            group: GroupId::default_group(),
        };
        let default_group = Group::default_group(created_at);

        Self {
            id,
            owner_id: owner_id.clone(),
            show: false,
            users: BTreeMap::from([(owner_id, owner)]),
            groups: BTreeMap::from([(default_group.id.clone(), default_group)]),
            confetti: BTreeMap::new(),
        }
    }

    pub fn owner(&self) -> Option<&User> {
        self.users.get(&self.owner_id)
    }

    pub fn user(&self, id: &UserId) -> Option<&User> {
        self.users.get(id)
    }

    pub fn group(&self, id: &GroupId) -> Option<&Group> {
        self.groups.get(id)
    }

    /// `"<owner>'s room"`, or `"Room <id>"` when the owner is not in the snapshot
    pub fn title(&self) -> String {
        match self.owner() {
            Some(owner) => format!("{}'s room", owner.name),
            None => format!("Room {}", self.id),
        }
    }

    /// Groups sorted by creation time, ties broken by id
    pub fn groups_in_display_order(&self) -> Vec<&Group> {
        let mut groups: Vec<&Group> = self.groups.values().collect();
        groups.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        groups
    }

    /// The group a user effectively belongs to.
    ///
    /// Users pointing at a group that no longer exists count as members of
    /// the default group.
    pub fn effective_group(&self, user: &User) -> GroupId {
        if self.groups.contains_key(&user.group) {
            user.group.clone()
        } else {
            GroupId::default_group()
        }
    }

    /// Users whose effective group is `group_id`
    pub fn members_of(&self, group_id: &GroupId) -> impl Iterator<Item = &User> + '_ {
        let group_id = group_id.clone();
        self.users
            .values()
            .filter(move |user| self.effective_group(user) == group_id)
    }

    /// Online users whose effective group is `group_id`, sorted by name
    pub fn online_members_of(&self, group_id: &GroupId) -> Vec<&User> {
        let mut members: Vec<&User> = self
            .members_of(group_id)
            .filter(|user| user.is_online)
            .collect();
        members.sort_by(|a, b| a.name.as_str().cmp(b.name.as_str()).then_with(|| a.id.cmp(&b.id)));
        members
    }
}

/// User entity, one participant of a room
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub name: UserName,
    /// True only for the room creator
    pub is_owner: bool,
    /// Maintained by the presence tracker
    pub is_online: bool,
    pub vote: Option<Vote>,
    pub group: GroupId,
}

impl User {
    /// A participant joining an existing room
    pub fn participant(id: UserId, name: UserName) -> Self {
        Self {
            id,
            name,
            is_owner: false,
            is_online: true,
            vote: None,
            group: GroupId::default_group(),
        }
    }

    pub fn has_voted(&self) -> bool {
        self.vote.is_some()
    }

    /// What other participants see for this user's vote
    pub fn visible_vote(&self, show: bool) -> &'static str {
        match (self.vote, show) {
            (Some(vote), true) => vote.label(),
            (Some(_), false) => "?",
            (None, _) => "",
        }
    }
}

/// Group entity, a voting sub-pool of a room
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub id: GroupId,
    pub name: GroupName,
    /// Creation time, used for display ordering only
    pub timestamp: Timestamp,
}

impl Group {
    pub fn default_group(timestamp: Timestamp) -> Self {
        Self {
            id: GroupId::default_group(),
            name: GroupName::default_group(),
            timestamp,
        }
    }
}

/// Normalized viewport coordinates (0.0..=1.0 on both axes)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Parameters of a confetti launch, before it gets an id
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfettiLaunch {
    /// Direction in degrees
    pub angle: f64,
    pub velocity: f64,
    pub position: Position,
}

impl ConfettiLaunch {
    /// Slingshot launch: pulling from `start` to `end` on a `viewport` sized
    /// surface (all in pixels) fires from `start` away from the pull.
    pub fn from_drag(start: (f64, f64), end: (f64, f64), viewport: (f64, f64)) -> Self {
        let (dx, dy) = (end.0 - start.0, end.1 - start.1);
        let normalize = |value: f64, size: f64| if size > 0.0 { value / size } else { 0.0 };

        Self {
            angle: dy.atan2(dx).to_degrees(),
            velocity: (dx * dx + dy * dy).sqrt() / 10.0,
            position: Position::new(normalize(start.0, viewport.0), normalize(start.1, viewport.1)),
        }
    }
}

impl Default for ConfettiLaunch {
    /// Straight up from the bottom center of the screen
    fn default() -> Self {
        Self {
            angle: 90.0,
            velocity: 45.0,
            position: Position::new(0.5, 1.0),
        }
    }
}

/// One celebration trigger broadcast to the whole room
#[derive(Debug, Clone, PartialEq)]
pub struct ConfettiEvent {
    pub id: ConfettiId,
    pub angle: f64,
    pub velocity: f64,
    pub position: Position,
    /// Set by the store when the event is written
    pub created_at: Option<Timestamp>,
}

/// Rendering parameters of a confetti burst
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfettiBurst {
    pub angle: f64,
    pub spread: f64,
    pub origin: Position,
    pub start_velocity: f64,
}

impl ConfettiEvent {
    pub const SPREAD: f64 = 45.0;

    pub fn new(id: ConfettiId, launch: ConfettiLaunch) -> Self {
        Self {
            id,
            angle: launch.angle,
            velocity: launch.velocity,
            position: launch.position,
            created_at: None,
        }
    }

    /// Launch angles are measured in screen space; the renderer mirrors them.
    pub fn burst(&self) -> ConfettiBurst {
        ConfettiBurst {
            angle: 180.0 - self.angle,
            spread: Self::SPREAD,
            origin: self.position,
            start_velocity: self.velocity,
        }
    }
}
