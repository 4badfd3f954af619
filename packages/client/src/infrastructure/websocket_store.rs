//! WebSocket Realtime Store 実装
//!
//! ドメイン層が定義する `RealtimeStore` trait を、hanabi-server との WebSocket 接続で実装します。
//!
//! - 書き込み系のメソッドはフレームを送信キューに積んだ時点で返る（サーバーの確認は待たない）
//! - 接続が切れたら一定間隔で再接続を試み、`ConnectionState` の遷移を通知する
//! - 一定時間サーバーから何も届かない接続は、ソケットが開いたままでも切断とみなす
//! - 再接続後は生きている購読だけを再送する。切断時の書き込みは再送しない
//!   （再登録はプレゼンス管理の役割）
//! - 切断中に積まれたフレームは再接続後に送られる。再接続を諦めた後の操作は
//!   `StoreError::Unavailable` になる

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use hanabi_core::domain::{ConnectionState, RealtimeStore, Snapshot, StoreError, StorePath, Subscription};
use hanabi_core::infrastructure::dto::wire::{ClientFrame, ServerFrame, SubscriptionId};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use crate::error::ClientError;

pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 再接続の方針
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    /// 受信が途絶えてから切断とみなすまでの時間
    pub idle_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RECONNECT_ATTEMPTS,
            interval: RECONNECT_INTERVAL,
            idle_timeout: IDLE_TIMEOUT,
        }
    }
}

impl ReconnectPolicy {
    /// `attempts_made` 回失敗した後に、もう一度試すべきか
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// 接続が生きていることをサーバーに示す Ping の間隔
    pub fn ping_interval(&self) -> Duration {
        (self.idle_timeout / 3).max(Duration::from_millis(1))
    }
}

struct Registration {
    path: StorePath,
    sender: mpsc::UnboundedSender<Snapshot>,
}

/// 接続タスクと `RealtimeStore` 実装の間で共有する状態
struct Shared {
    subscriptions: Mutex<HashMap<SubscriptionId, Registration>>,
    state: watch::Sender<ConnectionState>,
}

impl Shared {
    fn resubscribe_frames(registrations: &HashMap<SubscriptionId, Registration>) -> Vec<ClientFrame> {
        let mut live: Vec<(SubscriptionId, String)> = registrations
            .iter()
            .filter(|(_, registration)| !registration.sender.is_closed())
            .map(|(id, registration)| (*id, registration.path.to_string()))
            .collect();
        live.sort_unstable_by_key(|(id, _)| *id);
        live.into_iter()
            .map(|(id, path)| ClientFrame::Subscribe { id, path })
            .collect()
    }

    /// サーバーフレームを購読者に配る。購読者がいなくなった ID を返す
    async fn dispatch(&self, frame: ServerFrame) -> Option<SubscriptionId> {
        match frame {
            ServerFrame::Snapshot { id, value } => {
                let mut subscriptions = self.subscriptions.lock().await;
                let Some(registration) = subscriptions.get(&id) else {
                    tracing::debug!("Snapshot for unknown subscription {}", id);
                    return None;
                };
                let snapshot = Snapshot {
                    path: registration.path.clone(),
                    value: (!value.is_null()).then_some(value),
                };
                if registration.sender.send(snapshot).is_err() {
                    subscriptions.remove(&id);
                    return Some(id);
                }
                None
            }
            ServerFrame::Error { message } => {
                tracing::warn!("Store server rejected a frame: {}", message);
                None
            }
        }
    }
}

enum ConnectionEnd {
    /// ソケットが切れた（再接続する）
    Lost,
    /// ストアのハンドルが破棄された
    StoreDropped,
}

/// hanabi-server に WebSocket で接続するリアルタイムストア
pub struct WebSocketRealtimeStore {
    outbound: mpsc::UnboundedSender<ClientFrame>,
    shared: Arc<Shared>,
    next_subscription: AtomicU64,
    driver: JoinHandle<()>,
}

impl WebSocketRealtimeStore {
    /// 既定の再接続方針（5 秒間隔、最大 5 回）で接続
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        Self::connect_with(url, ReconnectPolicy::default()).await
    }

    /// 最初の接続に失敗した場合はエラーを返す（再接続は接続後の切断時にだけ行う）
    pub async fn connect_with(url: &str, policy: ReconnectPolicy) -> Result<Self, ClientError> {
        let (socket, _) = connect_async(url)
            .await
            .map_err(|e| ClientError::ConnectionError(e.to_string()))?;
        tracing::info!("Connected to store server at {}", url);

        let (state, _) = watch::channel(ConnectionState::Connected { session: 1 });
        let shared = Arc::new(Shared {
            subscriptions: Mutex::new(HashMap::new()),
            state,
        });
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(drive_connection(
            url.to_string(),
            socket,
            policy,
            outbound_rx,
            shared.clone(),
        ));

        Ok(Self {
            outbound,
            shared,
            next_subscription: AtomicU64::new(1),
            driver,
        })
    }

    /// 再接続を諦めた（またはストアが閉じられた）か
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    /// 再接続を諦めるまで待つ
    pub async fn closed(&self) {
        self.outbound.closed().await
    }

    fn send(&self, frame: ClientFrame) -> Result<(), StoreError> {
        self.outbound
            .send(frame)
            .map_err(|_| StoreError::Unavailable)
    }
}

impl Drop for WebSocketRealtimeStore {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

#[async_trait]
impl RealtimeStore for WebSocketRealtimeStore {
    async fn write(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        self.send(ClientFrame::Write {
            path: path.to_string(),
            value,
        })
    }

    async fn atomic_multi_write(
        &self,
        updates: BTreeMap<StorePath, Option<Value>>,
    ) -> Result<(), StoreError> {
        let updates = updates
            .into_iter()
            .map(|(path, value)| (path.to_string(), value.unwrap_or(Value::Null)))
            .collect();
        self.send(ClientFrame::Update { updates })
    }

    async fn remove(&self, path: &StorePath) -> Result<(), StoreError> {
        self.send(ClientFrame::Remove {
            path: path.to_string(),
        })
    }

    async fn subscribe(&self, path: &StorePath) -> Result<Subscription, StoreError> {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.shared.subscriptions.lock().await.insert(
            id,
            Registration {
                path: path.clone(),
                sender,
            },
        );

        if let Err(e) = self.send(ClientFrame::Subscribe {
            id,
            path: path.to_string(),
        }) {
            self.shared.subscriptions.lock().await.remove(&id);
            return Err(e);
        }
        Ok(Subscription::new(path.clone(), receiver))
    }

    async fn on_disconnect_write(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        self.send(ClientFrame::OnDisconnectWrite {
            path: path.to_string(),
            value,
        })
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }
}

async fn drive_connection(
    url: String,
    mut socket: Socket,
    policy: ReconnectPolicy,
    mut outbound: mpsc::UnboundedReceiver<ClientFrame>,
    shared: Arc<Shared>,
) {
    let mut session = 1;
    loop {
        shared
            .state
            .send_replace(ConnectionState::Connected { session });

        match serve_connection(socket, &policy, &mut outbound, &shared).await {
            ConnectionEnd::StoreDropped => {
                shared.state.send_replace(ConnectionState::Disconnected);
                return;
            }
            ConnectionEnd::Lost => {
                tracing::warn!("Connection to {} lost", url);
                shared.state.send_replace(ConnectionState::Disconnected);
            }
        }

        match reconnect(&url, &policy, &shared).await {
            Some(restored) => {
                socket = restored;
                session += 1;
                tracing::info!("Reconnected to {} (session {})", url, session);
            }
            None => {
                tracing::error!(
                    "Failed to reconnect after {} attempts. Giving up.",
                    policy.max_attempts
                );
                return;
            }
        }
    }
}

async fn reconnect(url: &str, policy: &ReconnectPolicy, shared: &Shared) -> Option<Socket> {
    let mut attempts = 0;
    while policy.should_retry(attempts) {
        attempts += 1;
        shared.state.send_replace(ConnectionState::Connecting);
        tracing::info!(
            "Reconnecting in {:?}... (attempt {}/{})",
            policy.interval,
            attempts,
            policy.max_attempts
        );
        tokio::time::sleep(policy.interval).await;

        match connect_async(url).await {
            Ok((socket, _)) => return Some(socket),
            Err(e) => {
                tracing::warn!("Reconnect attempt {} failed: {}", attempts, e);
                shared.state.send_replace(ConnectionState::Disconnected);
            }
        }
    }
    None
}

async fn send_frame(
    sink: &mut futures_util::stream::SplitSink<Socket, Message>,
    frame: &ClientFrame,
) -> Result<(), ()> {
    let json = match frame.to_json() {
        Ok(json) => json,
        Err(e) => {
            tracing::error!("Failed to serialize frame: {}", e);
            return Ok(());
        }
    };
    sink.send(Message::Text(json.into())).await.map_err(|e| {
        tracing::warn!("Failed to send frame: {}", e);
    })
}

async fn serve_connection(
    socket: Socket,
    policy: &ReconnectPolicy,
    outbound: &mut mpsc::UnboundedReceiver<ClientFrame>,
    shared: &Shared,
) -> ConnectionEnd {
    let (mut sink, mut stream) = socket.split();

    let resubscribe = {
        let subscriptions = shared.subscriptions.lock().await;
        Shared::resubscribe_frames(&subscriptions)
    };
    if !resubscribe.is_empty() {
        tracing::debug!("Restoring {} subscription(s)", resubscribe.len());
    }
    for frame in &resubscribe {
        if send_frame(&mut sink, frame).await.is_err() {
            return ConnectionEnd::Lost;
        }
    }

    let ping_interval = policy.ping_interval();
    let mut ticker = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    let _ = sink.close().await;
                    return ConnectionEnd::StoreDropped;
                };
                if send_frame(&mut sink, &frame).await.is_err() {
                    return ConnectionEnd::Lost;
                }
            }
            message = stream.next() => {
                let message = match message {
                    Some(Ok(message)) => message,
                    None => {
                        tracing::info!("Store server closed the connection");
                        return ConnectionEnd::Lost;
                    }
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket read error: {}", e);
                        return ConnectionEnd::Lost;
                    }
                };
                last_seen = Instant::now();

                let text = match message {
                    Message::Text(text) => text,
                    Message::Close(_) => {
                        tracing::info!("Store server closed the connection");
                        return ConnectionEnd::Lost;
                    }
                    _ => continue,
                };

                let frame = match ServerFrame::from_json(text.as_str()) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!("Failed to parse server frame: {}", e);
                        continue;
                    }
                };
                if let Some(id) = shared.dispatch(frame).await
                    && send_frame(&mut sink, &ClientFrame::Unsubscribe { id }).await.is_err()
                {
                    return ConnectionEnd::Lost;
                }
            }
            _ = ticker.tick() => {
                if let Err(e) = sink.send(Message::Ping(Default::default())).await {
                    tracing::warn!("Failed to send ping: {}", e);
                    return ConnectionEnd::Lost;
                }
            }
            _ = tokio::time::sleep_until(last_seen + policy.idle_timeout) => {
                tracing::warn!(
                    "No frame from the store server for {:?}",
                    policy.idle_timeout
                );
                return ConnectionEnd::Lost;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_should_retry_until_max_attempts() {
        // テスト項目: 失敗回数が上限に達するまで再接続を試みる
        // given (前提条件):
        let policy = ReconnectPolicy::default();

        // then (期待する結果):
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(MAX_RECONNECT_ATTEMPTS - 1));
        assert!(!policy.should_retry(MAX_RECONNECT_ATTEMPTS));
    }

    #[test]
    fn test_ping_interval_fits_within_idle_timeout() {
        // テスト項目: Ping は無音とみなす時間の 1/3 の間隔で送られる
        // given (前提条件):
        let policy = ReconnectPolicy {
            idle_timeout: Duration::from_millis(900),
            ..ReconnectPolicy::default()
        };

        // then (期待する結果):
        assert_eq!(policy.ping_interval(), Duration::from_millis(300));
        assert_eq!(ReconnectPolicy::default().ping_interval(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_dispatch_routes_snapshot_by_id() {
        // テスト項目: スナップショットは購読 ID で振り分けられ、null は値なしになる
        // given (前提条件):
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let shared = Shared {
            subscriptions: Mutex::new(HashMap::new()),
            state,
        };
        let (sender, mut receiver) = mpsc::unbounded_channel();
        shared.subscriptions.lock().await.insert(
            4,
            Registration {
                path: StorePath::parse("rooms/r1").unwrap(),
                sender,
            },
        );

        // when (操作):
        let first = shared
            .dispatch(ServerFrame::Snapshot { id: 4, value: json!({ "show": true }) })
            .await;
        let second = shared
            .dispatch(ServerFrame::Snapshot { id: 4, value: Value::Null })
            .await;
        let unknown = shared
            .dispatch(ServerFrame::Snapshot { id: 9, value: json!(1) })
            .await;

        // then (期待する結果):
        assert_eq!((first, second, unknown), (None, None, None));
        assert_eq!(receiver.recv().await.unwrap().value, Some(json!({ "show": true })));
        assert_eq!(receiver.recv().await.unwrap().value, None);
    }

    #[tokio::test]
    async fn test_dispatch_reports_dropped_subscription() {
        // テスト項目: 受け手がいなくなった購読は登録から外され、その ID が返る
        // given (前提条件):
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let shared = Shared {
            subscriptions: Mutex::new(HashMap::new()),
            state,
        };
        let (sender, receiver) = mpsc::unbounded_channel();
        shared.subscriptions.lock().await.insert(
            2,
            Registration {
                path: StorePath::parse("rooms/r1").unwrap(),
                sender,
            },
        );
        drop(receiver);

        // when (操作):
        let dropped = shared
            .dispatch(ServerFrame::Snapshot { id: 2, value: json!(false) })
            .await;

        // then (期待する結果):
        assert_eq!(dropped, Some(2));
        assert!(shared.subscriptions.lock().await.is_empty());
    }
}
