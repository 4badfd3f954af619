//! UseCase: WebSocket 1 本分のストアセッション
//!
//! クライアントから届いた `ClientFrame` を、そのソケット専用の `InMemoryConnection` に
//! 適用します。購読ごとに転送タスクを起動し、スナップショットを `ServerFrame` の JSON として
//! 送信キュー（`outbox`）に積みます。
//!
//! ソケットが閉じたら `close()` を呼び、切断時の書き込み（presence → offline）を実行させます。

use std::collections::{BTreeMap, HashMap};

use hanabi_core::domain::{RealtimeStore, StorePath, Subscription};
use hanabi_core::infrastructure::dto::wire::{ClientFrame, ServerFrame, SubscriptionId};
use hanabi_core::infrastructure::store::{InMemoryConnection, InMemoryRealtimeStore};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::error::FrameError;

pub struct StoreSession {
    connection: InMemoryConnection,
    outbox: mpsc::UnboundedSender<String>,
    subscriptions: HashMap<SubscriptionId, JoinHandle<()>>,
}

impl StoreSession {
    /// ストアへの新しい接続を開く
    pub fn open(store: &InMemoryRealtimeStore, outbox: mpsc::UnboundedSender<String>) -> Self {
        Self {
            connection: store.connect(),
            outbox,
            subscriptions: HashMap::new(),
        }
    }

    pub fn connection_id(&self) -> u64 {
        self.connection.id()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// テキストフレームを処理する
    ///
    /// 解釈・適用に失敗した場合は error フレームを返し、セッションは継続する。
    pub async fn handle_text(&mut self, text: &str) {
        let result = match ClientFrame::from_json(text) {
            Ok(frame) => self.apply(frame).await,
            Err(e) => Err(FrameError::from(e)),
        };

        if let Err(e) = result {
            tracing::warn!(
                "Connection {} sent a frame that could not be applied: {}",
                self.connection.id(),
                e
            );
            self.push(ServerFrame::Error {
                message: e.to_string(),
            });
        }
    }

    pub async fn apply(&mut self, frame: ClientFrame) -> Result<(), FrameError> {
        match frame {
            ClientFrame::Write { path, value } => {
                self.connection.write(&StorePath::parse(&path)?, value).await?;
            }
            ClientFrame::Update { updates } => {
                let updates = updates
                    .into_iter()
                    .map(|(path, value)| {
                        let value = (!value.is_null()).then_some(value);
                        Ok((StorePath::parse(&path)?, value))
                    })
                    .collect::<Result<BTreeMap<_, _>, FrameError>>()?;
                self.connection.atomic_multi_write(updates).await?;
            }
            ClientFrame::Remove { path } => {
                self.connection.remove(&StorePath::parse(&path)?).await?;
            }
            ClientFrame::Subscribe { id, path } => {
                let subscription = self.connection.subscribe(&StorePath::parse(&path)?).await?;
                let forwarder = forward_snapshots(id, subscription, self.outbox.clone());
                if let Some(previous) = self.subscriptions.insert(id, forwarder) {
                    tracing::debug!("Subscription {} replaced", id);
                    previous.abort();
                }
                tracing::debug!(
                    "Connection {} subscribed to {} as {}",
                    self.connection.id(),
                    path,
                    id
                );
            }
            ClientFrame::Unsubscribe { id } => {
                if let Some(forwarder) = self.subscriptions.remove(&id) {
                    forwarder.abort();
                }
            }
            ClientFrame::OnDisconnectWrite { path, value } => {
                self.connection
                    .on_disconnect_write(&StorePath::parse(&path)?, value)
                    .await?;
            }
        }
        Ok(())
    }

    /// 購読をすべて止め、接続断として切断時の書き込みを実行する
    pub async fn close(&mut self) {
        for (_, forwarder) in self.subscriptions.drain() {
            forwarder.abort();
        }
        self.connection.force_disconnect().await;
    }

    fn push(&self, frame: ServerFrame) {
        match frame.to_json() {
            Ok(json) => {
                // The socket is closing when the receiver is gone
                let _ = self.outbox.send(json);
            }
            Err(e) => tracing::error!("Failed to serialize frame: {}", e),
        }
    }
}

impl Drop for StoreSession {
    fn drop(&mut self) {
        for (_, forwarder) in self.subscriptions.drain() {
            forwarder.abort();
        }
    }
}

fn forward_snapshots(
    id: SubscriptionId,
    mut subscription: Subscription,
    outbox: mpsc::UnboundedSender<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(snapshot) = subscription.next().await {
            let frame = ServerFrame::Snapshot {
                id,
                value: snapshot.value.unwrap_or(Value::Null),
            };
            let json = match frame.to_json() {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("Failed to serialize snapshot {}: {}", id, e);
                    continue;
                }
            };
            if outbox.send(json).is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - StoreSession::handle_text() によるフレームの適用
    // - 購読スナップショットの転送と close() 時の切断処理
    //
    // 【どのようなシナリオをテストするか】
    // 1. 購読すると初期スナップショットが snapshot フレームとして届く
    // 2. update フレームは null を削除として扱う
    // 3. 解釈できないフレームには error フレームが返る
    // 4. close() で切断時の書き込みが実行される
    // 5. unsubscribe 後は転送されない
    // ========================================

    async fn recv_frame(outbox: &mut mpsc::UnboundedReceiver<String>) -> ServerFrame {
        let json = tokio::time::timeout(Duration::from_secs(1), outbox.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("outbox closed");
        ServerFrame::from_json(&json).unwrap()
    }

    #[tokio::test]
    async fn test_subscribe_forwards_snapshots() {
        // テスト項目: 購読すると現在の値と、その後の変更が snapshot フレームで届く
        // given (前提条件):
        let store = InMemoryRealtimeStore::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = StoreSession::open(&store, tx);

        // when (操作):
        session
            .handle_text(r#"{"type":"subscribe","id":1,"path":"rooms/r1/show"}"#)
            .await;
        let initial = recv_frame(&mut rx).await;
        session
            .handle_text(r#"{"type":"write","path":"rooms/r1/show","value":true}"#)
            .await;
        let changed = recv_frame(&mut rx).await;

        // then (期待する結果):
        assert_eq!(initial, ServerFrame::Snapshot { id: 1, value: Value::Null });
        assert_eq!(changed, ServerFrame::Snapshot { id: 1, value: json!(true) });
        assert_eq!(session.subscription_count(), 1);
    }

    #[tokio::test]
    async fn test_update_frame_deletes_null_paths() {
        // テスト項目: update フレームの null は削除としてアトミックに適用される
        // given (前提条件):
        let store = InMemoryRealtimeStore::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = StoreSession::open(&store, tx);
        session
            .handle_text(r#"{"type":"write","path":"rooms/r1","value":{"show":true,"users":{"u1":{"vote":5}}}}"#)
            .await;

        // when (操作):
        session
            .handle_text(r#"{"type":"update","updates":{"rooms/r1/show":false,"rooms/r1/users/u1/vote":null}}"#)
            .await;

        // then (期待する結果):
        let room = store.get(&StorePath::parse("rooms/r1").unwrap()).await.unwrap();
        assert_eq!(room["show"], json!(false));
        assert!(room.get("users").is_none());
    }

    #[tokio::test]
    async fn test_malformed_frame_is_answered_with_error() {
        // テスト項目: 解釈できないフレームや不正なパスには error フレームが返り、セッションは続く
        // given (前提条件):
        let store = InMemoryRealtimeStore::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = StoreSession::open(&store, tx);

        // when (操作):
        session.handle_text("hello").await;
        let malformed = recv_frame(&mut rx).await;
        session
            .handle_text(r#"{"type":"write","path":"rooms/a$b","value":1}"#)
            .await;
        let invalid_path = recv_frame(&mut rx).await;

        // then (期待する結果):
        assert!(matches!(malformed, ServerFrame::Error { .. }));
        match invalid_path {
            ServerFrame::Error { message } => assert!(message.contains("rooms/a$b")),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_close_runs_disconnect_writes() {
        // テスト項目: close() するとソケットで登録された切断時の書き込みが実行される
        // given (前提条件):
        let store = InMemoryRealtimeStore::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = StoreSession::open(&store, tx);
        session
            .handle_text(r#"{"type":"write","path":"rooms/r1/users/u1/isOnline","value":true}"#)
            .await;
        session
            .handle_text(r#"{"type":"on-disconnect-write","path":"rooms/r1/users/u1/isOnline","value":false}"#)
            .await;

        // when (操作):
        session.close().await;

        // then (期待する結果):
        let presence = store
            .get(&StorePath::parse("rooms/r1/users/u1/isOnline").unwrap())
            .await;
        assert_eq!(presence, Some(json!(false)));
        assert_eq!(session.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_forwarding() {
        // テスト項目: unsubscribe した購読のスナップショットは転送されない
        // given (前提条件):
        let store = InMemoryRealtimeStore::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = StoreSession::open(&store, tx);
        session
            .handle_text(r#"{"type":"subscribe","id":3,"path":"rooms/r1/show"}"#)
            .await;
        recv_frame(&mut rx).await;

        // when (操作):
        session.handle_text(r#"{"type":"unsubscribe","id":3}"#).await;
        session
            .handle_text(r#"{"type":"write","path":"rooms/r1/show","value":true}"#)
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        // then (期待する結果):
        assert!(rx.try_recv().is_err());
        assert_eq!(session.subscription_count(), 0);
    }
}
