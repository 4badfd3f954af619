//! Server execution logic.

use std::sync::Arc;
use std::time::Duration;

use axum::{Router, routing::get};
use hanabi_core::infrastructure::store::{ConfettiExpirySweeper, InMemoryRealtimeStore};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::{
    handler::{get_room_detail, health_check, websocket_handler},
    signal::shutdown_signal,
    state::{AppState, Heartbeat},
};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Age after which the sweeper deletes a confetti event
    pub confetti_ttl: Duration,
    pub sweep_interval: Duration,
    /// Liveness check of every WebSocket connection
    pub heartbeat: Heartbeat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            confetti_ttl: Duration::from_secs(5),
            sweep_interval: Duration::from_millis(1000),
            heartbeat: Heartbeat {
                interval: Duration::from_secs(10),
                idle_timeout: Duration::from_secs(30),
            },
        }
    }
}

/// Realtime store host
///
/// # Example
///
/// ```ignore
/// let server = Server::new(InMemoryRealtimeStore::new(), ServerConfig::default());
/// server.run("127.0.0.1".to_string(), 8080).await?;
/// ```
pub struct Server {
    store: InMemoryRealtimeStore,
    config: ServerConfig,
}

impl Server {
    pub fn new(store: InMemoryRealtimeStore, config: ServerConfig) -> Self {
        Self { store, config }
    }

    /// Routes of the store host, without the background sweeper
    pub fn router(&self) -> Router {
        let app_state = Arc::new(AppState::new(self.store.clone(), self.config.heartbeat));

        Router::new()
            // WebSocket エンドポイント
            .route("/ws", get(websocket_handler))
            // HTTP エンドポイント
            .route("/api/health", get(health_check))
            .route("/api/rooms/{room_id}", get(get_room_detail))
            .layer(TraceLayer::new_for_http())
            .with_state(app_state)
    }

    /// Bind to `host:port` and serve until Ctrl+C or SIGTERM
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let bind_addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&bind_addr).await?;

        tracing::info!(
            "Hanabi store server listening on {}",
            listener.local_addr()?
        );
        tracing::info!("Connect to: ws://{}/ws", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<(), Box<dyn std::error::Error>> {
        let app = self.router();

        let sweeper = ConfettiExpirySweeper::new(self.store.clone(), self.config.confetti_ttl);
        let sweep_task = tokio::spawn(sweeper.run(self.config.sweep_interval));

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await;
        sweep_task.abort();
        served?;

        tracing::info!("Server shutdown complete");

        Ok(())
    }
}
