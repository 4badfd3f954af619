//! InMemory Realtime Store 実装
//!
//! ドメイン層が定義する `RealtimeStore` trait の具体的な実装。
//! JSON ドキュメントツリーをインメモリ DB として使用します。
//!
//! - `InMemoryRealtimeStore`: プロセス内で共有されるストア本体
//! - `InMemoryConnection`: 1 クライアント分の接続。切断時の遅延書き込み（onDisconnect）と
//!   接続状態を持ち、`RealtimeStore` trait を実装する
//!
//! サーバーは WebSocket 接続ごとに `InMemoryConnection` を作り、テストは
//! 同じストアに複数の接続を作ることで複数クライアントを再現します。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use hanabi_shared::time::{Clock, SystemClock};
use serde_json::Value;
use tokio::sync::{Mutex, mpsc, watch};

use super::tree::{DocumentTree, resolve_server_values};
use crate::domain::{ConnectionState, RealtimeStore, Snapshot, StoreError, StorePath, Subscription};

struct Subscriber {
    path: StorePath,
    /// Last value delivered, used to skip notifications for unchanged values
    last: Option<Value>,
    sender: mpsc::UnboundedSender<Snapshot>,
}

#[derive(Default)]
struct Inner {
    tree: DocumentTree,
    subscribers: Vec<Subscriber>,
}

/// インメモリの共有ストア
///
/// Clone しても同じツリーを共有します。
#[derive(Clone)]
pub struct InMemoryRealtimeStore {
    inner: Arc<Mutex<Inner>>,
    clock: Arc<dyn Clock>,
    next_connection: Arc<AtomicU64>,
}

impl Default for InMemoryRealtimeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRealtimeStore {
    /// 新しい空のストアを作成（システム時刻を使用）
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// サーバータイムスタンプの解決に使う時計を指定してストアを作成
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            clock,
            next_connection: Arc::new(AtomicU64::new(1)),
        }
    }

    /// ストアの時計での現在時刻（Unix ミリ秒）
    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    /// 新しいクライアント接続を作成（接続済み状態で開始）
    pub fn connect(&self) -> InMemoryConnection {
        let id = self.next_connection.fetch_add(1, Ordering::SeqCst);
        InMemoryConnection::new(id, self.clone())
    }

    /// パスの現在の値を取得
    pub async fn get(&self, path: &StorePath) -> Option<Value> {
        let inner = self.inner.lock().await;
        inner.tree.get(path)
    }

    /// 複数パスの更新を 1 回の操作として適用し、影響を受ける購読者に通知
    ///
    /// `None` と `null` は削除を意味します。ルートパスへの書き込みは拒否されます。
    pub async fn apply(&self, updates: BTreeMap<StorePath, Option<Value>>) -> Result<(), StoreError> {
        if updates.keys().any(StorePath::is_root) {
            return Err(StoreError::InvalidPath(String::new()));
        }
        if updates.is_empty() {
            return Ok(());
        }

        let now = self.clock.now_millis();
        let mut inner = self.inner.lock().await;

        for (path, value) in &updates {
            let value = value
                .clone()
                .map(|value| resolve_server_values(value, now))
                .unwrap_or(Value::Null);
            inner.tree.set(path, value);
        }

        let Inner { tree, subscribers } = &mut *inner;
        subscribers.retain_mut(|subscriber| {
            let affected = updates.keys().any(|path| path.overlaps(&subscriber.path));
            if !affected {
                return !subscriber.sender.is_closed();
            }

            let current = tree.get(&subscriber.path);
            if current == subscriber.last {
                return !subscriber.sender.is_closed();
            }
            subscriber.last = current.clone();
            subscriber
                .sender
                .send(Snapshot {
                    path: subscriber.path.clone(),
                    value: current,
                })
                .is_ok()
        });

        tracing::trace!("Applied {} update(s) to the store", updates.len());
        Ok(())
    }

    /// パスを購読（現在の値を最初のスナップショットとして即座に配信）
    pub async fn subscribe(&self, path: &StorePath) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().await;

        let current = inner.tree.get(path);
        // The receiver is alive, sending cannot fail here
        let _ = sender.send(Snapshot {
            path: path.clone(),
            value: current.clone(),
        });
        inner.subscribers.push(Subscriber {
            path: path.clone(),
            last: current,
            sender,
        });

        Subscription::new(path.clone(), receiver)
    }

    /// 生きている購読の数（閉じられた購読は次の変更時に掃除される）
    pub async fn subscriber_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner
            .subscribers
            .iter()
            .filter(|subscriber| !subscriber.sender.is_closed())
            .count()
    }
}

/// ストアへの 1 クライアント分の接続
pub struct InMemoryConnection {
    id: u64,
    store: InMemoryRealtimeStore,
    state: watch::Sender<ConnectionState>,
    session: AtomicU64,
    /// 切断時に実行される書き込み（登録順）
    on_disconnect: Mutex<Vec<(StorePath, Value)>>,
}

impl InMemoryConnection {
    fn new(id: u64, store: InMemoryRealtimeStore) -> Self {
        let (state, _) = watch::channel(ConnectionState::Connected { session: 1 });
        Self {
            id,
            store,
            state,
            session: AtomicU64::new(1),
            on_disconnect: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn store(&self) -> &InMemoryRealtimeStore {
        &self.store
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }

    /// 接続断をシミュレート
    ///
    /// 登録済みの遅延書き込みを登録順に適用し、登録を破棄します。
    /// 既に切断済みの場合は何もしません。
    pub async fn force_disconnect(&self) {
        if !self.is_connected() {
            return;
        }
        self.state.send_replace(ConnectionState::Disconnected);

        let hooks = std::mem::take(&mut *self.on_disconnect.lock().await);
        tracing::debug!(
            "Connection {} closed, running {} disconnect write(s)",
            self.id,
            hooks.len()
        );
        for (path, value) in hooks {
            if let Err(e) = self
                .store
                .apply(BTreeMap::from([(path.clone(), Some(value))]))
                .await
            {
                tracing::warn!("Failed to apply disconnect write at {}: {}", path, e);
            }
        }
    }

    /// 再接続をシミュレート（新しいセッション番号で接続済み状態になる）
    pub fn reconnect(&self) {
        if self.is_connected() {
            return;
        }
        let session = self.session.fetch_add(1, Ordering::SeqCst) + 1;
        self.state
            .send_replace(ConnectionState::Connected { session });
        tracing::debug!("Connection {} reconnected (session {})", self.id, session);
    }

    fn ensure_connected(&self) -> Result<(), StoreError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(StoreError::Unavailable)
        }
    }
}

#[async_trait]
impl RealtimeStore for InMemoryConnection {
    async fn write(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        self.ensure_connected()?;
        self.store
            .apply(BTreeMap::from([(path.clone(), Some(value))]))
            .await
    }

    async fn atomic_multi_write(
        &self,
        updates: BTreeMap<StorePath, Option<Value>>,
    ) -> Result<(), StoreError> {
        self.ensure_connected()?;
        self.store.apply(updates).await
    }

    async fn remove(&self, path: &StorePath) -> Result<(), StoreError> {
        self.ensure_connected()?;
        self.store.apply(BTreeMap::from([(path.clone(), None)])).await
    }

    async fn subscribe(&self, path: &StorePath) -> Result<Subscription, StoreError> {
        self.ensure_connected()?;
        Ok(self.store.subscribe(path).await)
    }

    async fn on_disconnect_write(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        self.ensure_connected()?;
        if path.is_root() {
            return Err(StoreError::InvalidPath(String::new()));
        }
        self.on_disconnect.lock().await.push((path.clone(), value));
        Ok(())
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::server_timestamp;
    use hanabi_shared::time::FixedClock;
    use serde_json::json;

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - InMemoryRealtimeStore の読み書きと購読通知
    // - InMemoryConnection の切断時書き込みと接続状態
    //
    // 【どのようなシナリオをテストするか】
    // 1. 購読開始時の初期スナップショット
    // 2. 変更があったときだけ通知される
    // 3. 複数パスの更新は 1 回の通知にまとまる
    // 4. 切断時の書き込みが一度だけ実行される
    // 5. 切断中の書き込みは拒否される
    // ========================================

    fn path(raw: &str) -> StorePath {
        StorePath::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_subscribe_delivers_initial_snapshot() {
        // テスト項目: 購読すると現在の値（存在しなければ None）が最初に届く
        // given (前提条件):
        let store = InMemoryRealtimeStore::new();
        let conn = store.connect();
        conn.write(&path("rooms/r1/show"), json!(true)).await.unwrap();

        // when (操作):
        let mut existing = conn.subscribe(&path("rooms/r1")).await.unwrap();
        let mut missing = conn.subscribe(&path("rooms/r2")).await.unwrap();

        // then (期待する結果):
        assert_eq!(
            existing.next().await.unwrap().value,
            Some(json!({ "show": true }))
        );
        assert!(!missing.next().await.unwrap().exists());
    }

    #[tokio::test]
    async fn test_only_changes_are_notified() {
        // テスト項目: 購読パスの値が変わったときだけ通知され、無関係なパスや同じ値の書き込みは通知されない
        // given (前提条件):
        let store = InMemoryRealtimeStore::new();
        let conn = store.connect();
        let mut subscription = conn.subscribe(&path("rooms/r1")).await.unwrap();
        subscription.next().await.unwrap();

        // when (操作):
        conn.write(&path("rooms/r2/show"), json!(true)).await.unwrap();
        conn.write(&path("rooms/r1/show"), json!(true)).await.unwrap();
        conn.write(&path("rooms/r1/show"), json!(true)).await.unwrap();
        conn.remove(&path("rooms/r1/show")).await.unwrap();

        // then (期待する結果):
        assert_eq!(
            subscription.next().await.unwrap().value,
            Some(json!({ "show": true }))
        );
        assert_eq!(subscription.next().await.unwrap().value, None);
        assert!(subscription.try_next().is_none());
    }

    #[tokio::test]
    async fn test_atomic_multi_write_notifies_once() {
        // テスト項目: 複数パスの更新は 1 つのスナップショットとして観測される
        // given (前提条件):
        let store = InMemoryRealtimeStore::new();
        let conn = store.connect();
        conn.write(&path("rooms/r1/users/u1/vote"), json!(5)).await.unwrap();
        conn.write(&path("rooms/r1/show"), json!(true)).await.unwrap();
        let mut subscription = conn.subscribe(&path("rooms/r1")).await.unwrap();
        subscription.next().await.unwrap();

        // when (操作):
        conn.atomic_multi_write(BTreeMap::from([
            (path("rooms/r1/show"), Some(json!(false))),
            (path("rooms/r1/users/u1/vote"), None),
        ]))
        .await
        .unwrap();

        // then (期待する結果):
        assert_eq!(
            subscription.next().await.unwrap().value,
            Some(json!({ "show": false }))
        );
        assert!(subscription.try_next().is_none());
    }

    #[tokio::test]
    async fn test_server_timestamp_is_resolved_by_store_clock() {
        // テスト項目: サーバータイムスタンプはストアの時計で解決される
        // given (前提条件):
        let clock = Arc::new(FixedClock::new(42_000));
        let store = InMemoryRealtimeStore::with_clock(clock);
        let conn = store.connect();

        // when (操作):
        conn.write(
            &path("rooms/r1/groups/g1"),
            json!({ "id": "g1", "timestamp": server_timestamp() }),
        )
        .await
        .unwrap();

        // then (期待する結果):
        assert_eq!(
            store.get(&path("rooms/r1/groups/g1/timestamp")).await,
            Some(json!(42_000))
        );
    }

    #[tokio::test]
    async fn test_disconnect_write_fires_once() {
        // テスト項目: 切断時の書き込みは切断で一度だけ実行され、再接続後は再登録が必要
        // given (前提条件):
        let store = InMemoryRealtimeStore::new();
        let conn = store.connect();
        let presence = path("rooms/r1/users/u1/isOnline");
        conn.write(&presence, json!(true)).await.unwrap();
        conn.on_disconnect_write(&presence, json!(false)).await.unwrap();

        // when (操作):
        conn.force_disconnect().await;

        // then (期待する結果):
        assert_eq!(store.get(&presence).await, Some(json!(false)));
        assert_eq!(
            *conn.connection_state().borrow(),
            ConnectionState::Disconnected
        );

        conn.reconnect();
        conn.write(&presence, json!(true)).await.unwrap();
        conn.force_disconnect().await;
        assert_eq!(store.get(&presence).await, Some(json!(true)));
    }

    #[tokio::test]
    async fn test_writes_fail_while_disconnected() {
        // テスト項目: 切断中の書き込みは Unavailable で拒否され、再接続でセッション番号が進む
        // given (前提条件):
        let store = InMemoryRealtimeStore::new();
        let conn = store.connect();
        let state = conn.connection_state();
        conn.force_disconnect().await;

        // when (操作):
        let result = conn.write(&path("rooms/r1/show"), json!(true)).await;
        conn.reconnect();

        // then (期待する結果):
        assert_eq!(result, Err(StoreError::Unavailable));
        assert_eq!(*state.borrow(), ConnectionState::Connected { session: 2 });
        assert!(conn.write(&path("rooms/r1/show"), json!(true)).await.is_ok());
    }

    #[tokio::test]
    async fn test_dropped_subscriptions_are_pruned() {
        // テスト項目: 破棄された購読は次の変更で掃除される
        // given (前提条件):
        let store = InMemoryRealtimeStore::new();
        let conn = store.connect();
        let subscription = conn.subscribe(&path("rooms/r1")).await.unwrap();
        assert_eq!(store.subscriber_count().await, 1);

        // when (操作):
        subscription.unsubscribe();
        conn.write(&path("rooms/r1/show"), json!(true)).await.unwrap();

        // then (期待する結果):
        assert_eq!(store.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_root_writes_are_rejected() {
        // テスト項目: ルートパスへの書き込みは拒否される
        // given (前提条件):
        let store = InMemoryRealtimeStore::new();
        let conn = store.connect();

        // when (操作):
        let result = conn.write(&StorePath::root(), json!({ "rooms": {} })).await;

        // then (期待する結果):
        assert!(matches!(result, Err(StoreError::InvalidPath(_))));
    }
}
