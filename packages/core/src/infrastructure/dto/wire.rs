//! Frames exchanged between a store client and the store server over WebSocket.
//!
//! Every frame is a JSON text message tagged by `type`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Id the client picks for one of its subscriptions
pub type SubscriptionId = u64;

/// Client → Server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    /// Upsert one path, `null` deletes
    Write { path: String, value: Value },
    /// Atomic multi-path update, `null` values delete
    Update { updates: BTreeMap<String, Value> },
    Remove { path: String },
    Subscribe { id: SubscriptionId, path: String },
    Unsubscribe { id: SubscriptionId },
    /// Arm a write the server applies when this connection closes
    OnDisconnectWrite { path: String, value: Value },
}

/// Server → Client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerFrame {
    /// Value of a subscribed path, `null` when nothing is stored there
    Snapshot { id: SubscriptionId, value: Value },
    /// A frame the server could not apply
    Error { message: String },
}

impl ClientFrame {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl ServerFrame {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
