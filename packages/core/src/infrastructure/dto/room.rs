//! Room documents as they are stored.
//!
//! Field names are camelCase so that documents stay readable by every client
//! of the same store. Entries of `users`, `groups` and `confetti` are kept as
//! raw JSON here and validated one by one during conversion, so one broken
//! entry does not make the whole room unreadable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Newest schema version this crate reads and writes
pub const SCHEMA_VERSION: u32 = 1;

fn default_group_id() -> String {
    "default".to_string()
}

/// `rooms/{roomId}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDocument {
    /// Absent in documents written before versioning, read as version 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,
    pub id: String,
    pub owner_id: String,
    #[serde(default)]
    pub show: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub users: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub groups: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub confetti: BTreeMap<String, Value>,
}

/// `rooms/{roomId}/users/{userId}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDocument {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_owner: bool,
    #[serde(default)]
    pub is_online: bool,
    /// A card as number or label; `null` / absent when not voted
    #[serde(default)]
    pub vote: Value,
    #[serde(default = "default_group_id")]
    pub group: String,
}

/// `rooms/{roomId}/groups/{groupId}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDocument {
    pub id: String,
    pub name: String,
    /// Unix millis once resolved; the server timestamp sentinel when written
    #[serde(default)]
    pub timestamp: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionDocument {
    pub x: f64,
    pub y: f64,
}

/// `rooms/{roomId}/confetti/{eventId}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfettiDocument {
    pub id: String,
    pub angle: f64,
    pub velocity: f64,
    pub position: PositionDocument,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub created_at: Value,
}
