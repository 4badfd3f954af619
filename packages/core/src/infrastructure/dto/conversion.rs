//! Conversion logic between stored documents and domain entities.
//!
//! Decoding is where untrusted snapshots become typed rooms: the whole room
//! is rejected when its identity is broken, single entries are dropped with a
//! warning when they are malformed.

use serde_json::{Value, json};
use thiserror::Error;

use crate::domain::{
    ConfettiEvent, ConfettiId, Group, GroupId, GroupName, Position, Room, RoomId, Timestamp, User,
    UserId, UserName, ValueObjectError, Vote, server_timestamp,
};

use super::room::{
    ConfettiDocument, GroupDocument, PositionDocument, RoomDocument, SCHEMA_VERSION, UserDocument,
};

/// Errors raised while decoding a stored document
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("malformed document: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported schema version {found} (supported up to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("invalid {field}: {source}")]
    InvalidField {
        field: &'static str,
        #[source]
        source: ValueObjectError,
    },

    #[error("entry key '{key}' does not match its id '{id}'")]
    KeyMismatch { key: String, id: String },
}

fn field<T>(field: &'static str, result: Result<T, ValueObjectError>) -> Result<T, SchemaError> {
    result.map_err(|source| SchemaError::InvalidField { field, source })
}

// ========================================
// Vote
// ========================================

/// Cards are stored as JSON numbers
pub fn vote_to_value(vote: Option<Vote>) -> Value {
    match vote {
        Some(vote) if vote.value().fract() == 0.0 => json!(vote.value() as u64),
        Some(vote) => json!(vote.value()),
        None => Value::Null,
    }
}

/// Read a stored card. Unknown cards are sanitized to "no vote".
pub fn vote_from_value(value: &Value) -> Option<Vote> {
    let vote = match value {
        Value::Null => return None,
        Value::Number(number) => number.as_f64().and_then(Vote::from_number),
        Value::String(text) => Vote::parse(text).ok(),
        _ => None,
    };
    if vote.is_none() {
        tracing::warn!("Ignoring vote {} that is not a card of the deck", value);
    }
    vote
}

fn timestamp_from_value(value: &Value) -> Option<Timestamp> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|millis| millis as i64))
        .map(Timestamp::new)
}

// ========================================
// Document → Domain Entity
// ========================================

impl TryFrom<UserDocument> for User {
    type Error = SchemaError;

    fn try_from(doc: UserDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: field("user id", UserId::new(doc.id))?,
            name: field("user name", UserName::new(doc.name))?,
            is_owner: doc.is_owner,
            is_online: doc.is_online,
            vote: vote_from_value(&doc.vote),
            group: field("user group", GroupId::new(doc.group))?,
        })
    }
}

impl TryFrom<GroupDocument> for Group {
    type Error = SchemaError;

    fn try_from(doc: GroupDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: field("group id", GroupId::new(doc.id))?,
            name: field("group name", GroupName::new(doc.name))?,
            timestamp: timestamp_from_value(&doc.timestamp).unwrap_or_default(),
        })
    }
}

impl TryFrom<ConfettiDocument> for ConfettiEvent {
    type Error = SchemaError;

    fn try_from(doc: ConfettiDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: field("confetti id", ConfettiId::new(doc.id))?,
            angle: doc.angle,
            velocity: doc.velocity,
            position: Position::new(doc.position.x, doc.position.y),
            created_at: timestamp_from_value(&doc.created_at),
        })
    }
}

/// Decode the entries of one collection, dropping the broken ones
fn decode_entries<D, E>(
    collection: &'static str,
    raw: std::collections::BTreeMap<String, Value>,
    id_of: impl Fn(&E) -> &str,
) -> Vec<E>
where
    D: serde::de::DeserializeOwned,
    E: TryFrom<D, Error = SchemaError>,
{
    raw.into_iter()
        .filter_map(|(key, value)| {
            let entry = serde_json::from_value::<D>(value)
                .map_err(SchemaError::from)
                .and_then(E::try_from)
                .and_then(|entry| {
                    if id_of(&entry) == key {
                        Ok(entry)
                    } else {
                        Err(SchemaError::KeyMismatch {
                            key: key.clone(),
                            id: id_of(&entry).to_string(),
                        })
                    }
                });
            match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Dropping {} entry '{}': {}", collection, key, e);
                    None
                }
            }
        })
        .collect()
}

/// Validate a room snapshot into a `Room`.
///
/// The `"default"` group is synthesized when the snapshot lacks it.
pub fn decode_room(value: Value) -> Result<Room, SchemaError> {
    let doc: RoomDocument = serde_json::from_value(value)?;

    let version = doc.schema_version.unwrap_or(1);
    if version > SCHEMA_VERSION {
        return Err(SchemaError::UnsupportedVersion {
            found: version,
            supported: SCHEMA_VERSION,
        });
    }

    let id = field("room id", RoomId::new(doc.id))?;
    let owner_id = field("owner id", UserId::new(doc.owner_id))?;

    let users = decode_entries::<UserDocument, User>("user", doc.users, |user| user.id.as_str())
        .into_iter()
        .map(|user| (user.id.clone(), user))
        .collect();

    let mut groups: std::collections::BTreeMap<GroupId, Group> =
        decode_entries::<GroupDocument, Group>("group", doc.groups, |group| group.id.as_str())
            .into_iter()
            .map(|group| (group.id.clone(), group))
            .collect();
    groups
        .entry(GroupId::default_group())
        .or_insert_with(|| Group::default_group(Timestamp::default()));

    let confetti = decode_entries::<ConfettiDocument, ConfettiEvent>(
        "confetti",
        doc.confetti,
        |event| event.id.as_str(),
    )
    .into_iter()
    .map(|event| (event.id.clone(), event))
    .collect();

    Ok(Room {
        id,
        owner_id,
        show: doc.show,
        users,
        groups,
        confetti,
    })
}

// ========================================
// Domain Entity → Document
// ========================================

impl From<&User> for UserDocument {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.as_str().to_string(),
            name: user.name.as_str().to_string(),
            is_owner: user.is_owner,
            is_online: user.is_online,
            vote: vote_to_value(user.vote),
            group: user.group.as_str().to_string(),
        }
    }
}

impl From<&Group> for GroupDocument {
    /// Groups are only ever written when they are created, so the creation
    /// time is left to the store's clock.
    fn from(group: &Group) -> Self {
        Self {
            id: group.id.as_str().to_string(),
            name: group.name.as_str().to_string(),
            timestamp: server_timestamp(),
        }
    }
}

impl From<&ConfettiEvent> for ConfettiDocument {
    /// Events are stamped by the store so the server side TTL can expire them.
    fn from(event: &ConfettiEvent) -> Self {
        Self {
            id: event.id.as_str().to_string(),
            angle: event.angle,
            velocity: event.velocity,
            position: PositionDocument {
                x: event.position.x,
                y: event.position.y,
            },
            created_at: server_timestamp(),
        }
    }
}

impl From<&Room> for RoomDocument {
    fn from(room: &Room) -> Self {
        fn entries<'a, T: 'a, D: serde::Serialize>(
            items: impl Iterator<Item = (&'a str, &'a T)>,
            to_doc: impl Fn(&'a T) -> D,
        ) -> std::collections::BTreeMap<String, Value> {
            items
                .filter_map(|(key, item)| {
                    serde_json::to_value(to_doc(item))
                        .ok()
                        .map(|value| (key.to_string(), value))
                })
                .collect()
        }

        Self {
            schema_version: Some(SCHEMA_VERSION),
            id: room.id.as_str().to_string(),
            owner_id: room.owner_id.as_str().to_string(),
            show: room.show,
            users: entries(
                room.users.iter().map(|(id, user)| (id.as_str(), user)),
                |user| UserDocument::from(user),
            ),
            groups: entries(
                room.groups.iter().map(|(id, group)| (id.as_str(), group)),
                |group| GroupDocument::from(group),
            ),
            confetti: entries(
                room.confetti.iter().map(|(id, event)| (id.as_str(), event)),
                |event| ConfettiDocument::from(event),
            ),
        }
    }
}

/// Encode any document as a store value
pub fn to_store_value<D: serde::Serialize>(doc: &D) -> Result<Value, serde_json::Error> {
    serde_json::to_value(doc)
}
