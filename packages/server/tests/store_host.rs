//! Integration tests for the store host: an in-process server on an ephemeral
//! port, driven over HTTP (reqwest) and WebSocket (tokio-tungstenite).

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use hanabi_core::infrastructure::dto::wire::{ClientFrame, ServerFrame};
use hanabi_core::infrastructure::store::InMemoryRealtimeStore;
use hanabi_server::ui::{Heartbeat, Server, ServerConfig};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Start a server on an ephemeral port; it stops when the test runtime ends
async fn start_server(config: ServerConfig) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Server::new(InMemoryRealtimeStore::new(), config);
    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });
    addr
}

async fn connect(addr: SocketAddr) -> Socket {
    let (socket, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    socket
}

async fn send(socket: &mut Socket, frame: ClientFrame) {
    socket
        .send(Message::Text(frame.to_json().unwrap().into()))
        .await
        .unwrap();
}

async fn recv(socket: &mut Socket) -> ServerFrame {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return ServerFrame::from_json(text.as_str()).unwrap();
        }
    }
}

/// Receive snapshots of subscription `id` until one matches `predicate`
async fn recv_snapshot_until(socket: &mut Socket, id: u64, predicate: impl Fn(&Value) -> bool) -> Value {
    loop {
        if let ServerFrame::Snapshot { id: got, value } = recv(socket).await
            && got == id
            && predicate(&value)
        {
            return value;
        }
    }
}

#[tokio::test]
async fn test_health_check() {
    // テスト項目: ヘルスチェックが status ok を返す
    // given (前提条件):
    let addr = start_server(ServerConfig::default()).await;

    // when (操作):
    let body: Value = reqwest::get(format!("http://{}/api/health", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // then (期待する結果):
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_room_endpoint_status_codes() {
    // テスト項目: 存在しないルームは 404、不正な ID は 400、書き込まれたルームは JSON で返る
    // given (前提条件):
    let addr = start_server(ServerConfig::default()).await;
    let mut socket = connect(addr).await;
    send(
        &mut socket,
        ClientFrame::Write {
            path: "rooms/r1".to_string(),
            value: json!({ "id": "r1", "ownerId": "u1", "show": false }),
        },
    )
    .await;
    // A subscription snapshot confirms the write has been applied
    send(
        &mut socket,
        ClientFrame::Subscribe {
            id: 1,
            path: "rooms/r1".to_string(),
        },
    )
    .await;
    recv_snapshot_until(&mut socket, 1, |value| !value.is_null()).await;

    // when (操作):
    let found = reqwest::get(format!("http://{}/api/rooms/r1", addr)).await.unwrap();
    let missing = reqwest::get(format!("http://{}/api/rooms/nope", addr)).await.unwrap();
    let invalid = reqwest::get(format!("http://{}/api/rooms/a.b", addr)).await.unwrap();

    // then (期待する結果):
    assert_eq!(found.status(), reqwest::StatusCode::OK);
    assert_eq!(found.json::<Value>().await.unwrap()["ownerId"], json!("u1"));
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
    assert_eq!(invalid.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_writes_are_pushed_to_other_clients() {
    // テスト項目: あるクライアントの書き込みが、同じパスを購読する別クライアントに届く
    // given (前提条件):
    let addr = start_server(ServerConfig::default()).await;
    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;
    send(
        &mut bob,
        ClientFrame::Subscribe {
            id: 7,
            path: "rooms/r1/show".to_string(),
        },
    )
    .await;
    let initial = recv(&mut bob).await;

    // when (操作):
    send(
        &mut alice,
        ClientFrame::Write {
            path: "rooms/r1/show".to_string(),
            value: json!(true),
        },
    )
    .await;

    // then (期待する結果):
    assert_eq!(initial, ServerFrame::Snapshot { id: 7, value: Value::Null });
    assert_eq!(recv_snapshot_until(&mut bob, 7, Value::is_boolean).await, json!(true));
}

#[tokio::test]
async fn test_closing_socket_fires_disconnect_writes() {
    // テスト項目: ソケットが閉じると、そのクライアントの切断時書き込みが実行される
    // given (前提条件):
    let addr = start_server(ServerConfig::default()).await;
    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;
    let presence = "rooms/r1/users/u1/isOnline".to_string();
    send(
        &mut alice,
        ClientFrame::OnDisconnectWrite {
            path: presence.clone(),
            value: json!(false),
        },
    )
    .await;
    send(
        &mut alice,
        ClientFrame::Write {
            path: presence.clone(),
            value: json!(true),
        },
    )
    .await;
    send(&mut bob, ClientFrame::Subscribe { id: 1, path: presence }).await;
    recv_snapshot_until(&mut bob, 1, |value| value == &json!(true)).await;

    // when (操作):
    drop(alice);

    // then (期待する結果):
    let offline = recv_snapshot_until(&mut bob, 1, |value| value == &json!(false)).await;
    assert_eq!(offline, json!(false));
}

#[tokio::test]
async fn test_silent_client_is_disconnected_after_idle_timeout() {
    // テスト項目: ソケットを開いたまま応答しなくなったクライアントはアイドル時間後に切断され、切断時書き込みが実行される
    // given (前提条件):
    let addr = start_server(ServerConfig {
        heartbeat: Heartbeat {
            interval: Duration::from_millis(50),
            idle_timeout: Duration::from_millis(300),
        },
        ..ServerConfig::default()
    })
    .await;
    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;
    let presence = "rooms/r1/users/u1/isOnline".to_string();
    send(
        &mut alice,
        ClientFrame::OnDisconnectWrite {
            path: presence.clone(),
            value: json!(false),
        },
    )
    .await;
    send(
        &mut alice,
        ClientFrame::Write {
            path: presence.clone(),
            value: json!(true),
        },
    )
    .await;
    send(&mut bob, ClientFrame::Subscribe { id: 1, path: presence }).await;
    recv_snapshot_until(&mut bob, 1, |value| value == &json!(true)).await;

    // when (操作):
    // alice は以降ソケットを読まず、Ping にも応答しない

    // then (期待する結果):
    let offline = recv_snapshot_until(&mut bob, 1, |value| value == &json!(false)).await;
    assert_eq!(offline, json!(false));
    drop(alice);
}

#[tokio::test]
async fn test_malformed_frame_gets_error_reply() {
    // テスト項目: 解釈できないフレームには error フレームが返り、接続は維持される
    // given (前提条件):
    let addr = start_server(ServerConfig::default()).await;
    let mut socket = connect(addr).await;

    // when (操作):
    socket
        .send(Message::Text("{\"type\":\"transaction\"}".into()))
        .await
        .unwrap();
    let reply = recv(&mut socket).await;
    send(
        &mut socket,
        ClientFrame::Subscribe {
            id: 2,
            path: "rooms".to_string(),
        },
    )
    .await;

    // then (期待する結果):
    assert!(matches!(reply, ServerFrame::Error { .. }));
    assert_eq!(recv(&mut socket).await, ServerFrame::Snapshot { id: 2, value: Value::Null });
}

#[tokio::test]
async fn test_sweeper_expires_abandoned_confetti() {
    // テスト項目: 発行者が削除しなかった紙吹雪も、サーバー側の TTL で削除される
    // given (前提条件):
    let addr = start_server(ServerConfig {
        confetti_ttl: Duration::from_millis(200),
        sweep_interval: Duration::from_millis(50),
        ..ServerConfig::default()
    })
    .await;
    let mut socket = connect(addr).await;
    send(
        &mut socket,
        ClientFrame::Subscribe {
            id: 1,
            path: "rooms/r1/confetti".to_string(),
        },
    )
    .await;
    recv(&mut socket).await;

    // when (操作):
    send(
        &mut socket,
        ClientFrame::Write {
            path: "rooms/r1/confetti/c1".to_string(),
            value: json!({ "angle": 90, "velocity": 30, "position": { "x": 0.5, "y": 1.0 }, "createdAt": { ".sv": "timestamp" } }),
        },
    )
    .await;
    let published = recv_snapshot_until(&mut socket, 1, |value| !value.is_null()).await;

    // then (期待する結果):
    assert!(published["c1"]["createdAt"].is_i64());
    let expired = recv_snapshot_until(&mut socket, 1, Value::is_null).await;
    assert_eq!(expired, Value::Null);
}
