//! WebSocket connection handlers.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, MissedTickBehavior};

use crate::{ui::state::AppState, usecase::StoreSession};

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Spawns a task that receives frames from the rx channel and pushes them to the WebSocket sender.
///
/// A ping is sent every `ping_interval` so that a silent peer shows up as idle.
///
/// # Arguments
///
/// * `rx` - Channel receiver for serialized server frames
/// * `sender` - WebSocket sink to send frames to this client
/// * `ping_interval` - Interval between pings
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
    ping_interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let msg = tokio::select! {
                frame = rx.recv() => match frame {
                    Some(frame) => Message::Text(frame.into()),
                    None => break,
                },
                _ = ticker.tick() => Message::Ping(Default::default()),
            };
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    })
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sender, mut receiver) = socket.split();

    let (tx, rx) = mpsc::unbounded_channel();
    let mut session = StoreSession::open(&state.store, tx);
    let connection_id = session.connection_id();
    tracing::info!("Connection {} opened", connection_id);

    let heartbeat = state.heartbeat;
    let mut send_task = pusher_loop(rx, sender, heartbeat.interval);
    let mut last_seen = Instant::now();

    // Frames are applied in arrival order on this task; the loop ends when
    // either direction of the socket goes away or the peer stays silent for
    // longer than the idle timeout.
    loop {
        tokio::select! {
            msg = receiver.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket error on connection {}: {}", connection_id, e);
                        break;
                    }
                    None => break,
                };
                last_seen = Instant::now();

                match msg {
                    Message::Text(text) => {
                        tracing::trace!("Connection {} received: {}", connection_id, text.as_str());
                        session.handle_text(text.as_str()).await;
                    }
                    Message::Ping(_) => {
                        tracing::debug!("Received ping");
                    }
                    Message::Close(_) => {
                        tracing::info!("Connection {} requested close", connection_id);
                        break;
                    }
                    _ => {}
                }
            }
            _ = tokio::time::sleep_until(last_seen + heartbeat.idle_timeout) => {
                tracing::warn!(
                    "Connection {} idle for {:?}, closing",
                    connection_id,
                    heartbeat.idle_timeout
                );
                break;
            }
            _ = &mut send_task => break,
        }
    }
    send_task.abort();

    session.close().await;
    tracing::info!("Connection {} closed", connection_id);
}
