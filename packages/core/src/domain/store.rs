//! Realtime store trait 定義
//!
//! ルームの共有ドキュメントを保持するリアルタイムストアへのインターフェース。
//! UseCase 層はこの trait に依存し、Infrastructure 層の具体的な実装
//! （インメモリ、WebSocket）には依存しない。
//!
//! ## ストアが提供する保証
//!
//! - パス単位の last-write-wins 書き込み
//! - 複数パスのアトミックな更新（`null` は削除）
//! - 購読時の初期スナップショットと、変更ごとのプッシュ通知
//! - 接続断を検知したときに一度だけ実行される遅延書き込み（再接続後は再登録が必要）
//! - サーバー側で解決されるタイムスタンプ

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};

use super::error::StoreError;

/// A value the store replaces with its own clock (Unix millis) at write time.
pub fn server_timestamp() -> Value {
    json!({ ".sv": "timestamp" })
}

/// Whether `value` is the [`server_timestamp`] sentinel
pub fn is_server_timestamp(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|map| map.len() == 1 && map.get(".sv").and_then(Value::as_str) == Some("timestamp"))
}

/// Address of a node in the store, e.g. `rooms/r1/users/u1/isOnline`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a slash separated path coming from outside the process.
    ///
    /// Leading and trailing slashes are ignored; empty segments and the
    /// characters `. # $ [ ]` are rejected.
    pub fn parse(path: &str) -> Result<Self, StoreError> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        let segments: Vec<String> = trimmed.split('/').map(str::to_string).collect();
        let invalid = segments.iter().any(|segment| {
            segment.is_empty()
                || segment
                    .chars()
                    .any(|ch| matches!(ch, '.' | '#' | '$' | '[' | ']') || ch.is_control())
        });
        if invalid {
            return Err(StoreError::InvalidPath(path.to_string()));
        }

        Ok(Self { segments })
    }

    /// Append a segment. Callers pass validated ids or literal keys.
    pub fn child(&self, segment: impl AsRef<str>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.as_ref().to_string());
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether `self` equals `other` or is one of its ancestors
    pub fn contains(&self, other: &StorePath) -> bool {
        other.segments.starts_with(&self.segments)
    }

    /// Whether a change at one path can affect the value at the other
    pub fn overlaps(&self, other: &StorePath) -> bool {
        self.contains(other) || other.contains(self)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

/// Connection state of one client to the store.
///
/// `session` increases on every successful (re)connection, so observers that
/// only sample the latest state can still tell two connections apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected { session: u64 },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }
}

/// Value of a subscribed path at one point in time
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub path: StorePath,
    /// `None` when nothing is stored at the path
    pub value: Option<Value>,
}

impl Snapshot {
    pub fn exists(&self) -> bool {
        self.value.is_some()
    }
}

/// Live subscription handle.
///
/// Snapshots are delivered in order. Dropping the handle (or calling
/// [`Subscription::unsubscribe`]) ends the subscription; the store notices on
/// its next change.
#[derive(Debug)]
pub struct Subscription {
    path: StorePath,
    receiver: mpsc::UnboundedReceiver<Snapshot>,
}

impl Subscription {
    pub fn new(path: StorePath, receiver: mpsc::UnboundedReceiver<Snapshot>) -> Self {
        Self { path, receiver }
    }

    pub fn path(&self) -> &StorePath {
        &self.path
    }

    /// Wait for the next snapshot. `None` once the store side has gone away.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.receiver.recv().await
    }

    /// Next snapshot if one is already queued
    pub fn try_next(&mut self) -> Option<Snapshot> {
        self.receiver.try_recv().ok()
    }

    pub fn unsubscribe(self) {}
}

/// Realtime Store trait
///
/// ## 書き込みのセマンティクス
///
/// 書き込み系のメソッドはストアが受け付けた時点（ローカルで適用、または送信キューに
/// 積んだ時点）で返り、サーバーからの確認は待たない。書き込みの結果は次に届く
/// スナップショットでのみ観測できる。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RealtimeStore: Send + Sync {
    /// Upsert `value` at `path` (`null` deletes)
    async fn write(&self, path: &StorePath, value: Value) -> Result<(), StoreError>;

    /// Apply every update in one indivisible operation; `None` deletes the path
    async fn atomic_multi_write(
        &self,
        updates: BTreeMap<StorePath, Option<Value>>,
    ) -> Result<(), StoreError>;

    async fn remove(&self, path: &StorePath) -> Result<(), StoreError>;

    /// Subscribe to the subtree at `path`, starting with its current value
    async fn subscribe(&self, path: &StorePath) -> Result<Subscription, StoreError>;

    /// Arm a write that the store performs once it detects that this client's
    /// connection is gone
    async fn on_disconnect_write(&self, path: &StorePath, value: Value) -> Result<(), StoreError>;

    /// Current connection state and its future transitions
    fn connection_state(&self) -> watch::Receiver<ConnectionState>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_path() {
        // テスト項目: スラッシュ区切りのパスが解釈され、前後のスラッシュは無視される
        // given (前提条件):
        let raw = "/rooms/r1/users/";

        // when (操作):
        let path = StorePath::parse(raw).unwrap();

        // then (期待する結果):
        assert_eq!(path.segments(), &["rooms", "r1", "users"]);
        assert_eq!(path.to_string(), "rooms/r1/users");
        assert!(StorePath::parse("").unwrap().is_root());
    }

    #[test]
    fn test_parse_path_rejects_invalid_segments() {
        // テスト項目: 空のセグメントや禁止文字を含むパスは拒否される
        // then (期待する結果):
        assert_eq!(
            StorePath::parse("rooms//users"),
            Err(StoreError::InvalidPath("rooms//users".to_string()))
        );
        assert!(StorePath::parse("rooms/.info").is_err());
        assert!(StorePath::parse("rooms/a$b").is_err());
    }

    #[test]
    fn test_path_overlaps() {
        // テスト項目: 祖先・子孫の関係にあるパスだけが重なりと判定される
        // given (前提条件):
        let room = StorePath::parse("rooms/r1").unwrap();
        let vote = room.child("users").child("u1").child("vote");
        let other_room = StorePath::parse("rooms/r2").unwrap();

        // then (期待する結果):
        assert!(room.contains(&vote));
        assert!(!vote.contains(&room));
        assert!(room.overlaps(&vote));
        assert!(vote.overlaps(&room));
        assert!(!room.overlaps(&other_room));
        assert!(StorePath::root().overlaps(&other_room));
    }

    #[test]
    fn test_server_timestamp_sentinel() {
        // テスト項目: サーバータイムスタンプの番兵値を判定できる
        // then (期待する結果):
        assert!(is_server_timestamp(&server_timestamp()));
        assert!(!is_server_timestamp(&json!({ ".sv": "increment" })));
        assert!(!is_server_timestamp(&json!(1000)));
    }
}
