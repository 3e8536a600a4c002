//! Server execution logic.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use super::{
    handler::{
        http::{
            cleanup_inactive_rooms, end_room_admin, export_room_history, get_admin_config,
            get_admin_rooms, get_admin_stats, get_room_history, get_room_messages,
            get_room_status, health_check, leave_queue, match_participant, reset_all_agents,
            set_admin_config,
        },
        websocket::websocket_handler,
    },
    signal::shutdown_signal,
    state::AppState,
};

/// Participant matching chat server
///
/// This struct encapsulates the wired application state and provides
/// methods to build the router and run the server.
///
/// # Example
///
/// ```ignore
/// let server = Server::new(app_state);
/// server.run("127.0.0.1".to_string(), 8080).await?;
/// ```
pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    /// Create a new Server instance from wired application state
    pub fn new(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Build the router (exposed separately so tests can serve it in-process)
    pub fn router(&self) -> Router {
        Router::new()
            // WebSocket エンドポイント
            .route("/ws/chat/{room_id}/{uid}", get(websocket_handler))
            // マッチング
            .route("/match", get(match_participant))
            .route("/api/queue/leave", post(leave_queue))
            // ルーム
            .route("/api/rooms/{room_id}", get(get_room_status))
            .route("/api/rooms/{room_id}/history", get(get_room_history))
            // 管理者
            .route(
                "/api/admin/config",
                get(get_admin_config).post(set_admin_config),
            )
            .route("/api/admin/rooms", get(get_admin_rooms))
            .route("/api/admin/rooms/cleanup", post(cleanup_inactive_rooms))
            .route("/api/admin/rooms/{room_id}/messages", get(get_room_messages))
            .route("/api/admin/rooms/{room_id}/end", post(end_room_admin))
            .route("/api/admin/rooms/{room_id}/export", get(export_room_history))
            .route("/api/admin/stats", get(get_admin_stats))
            .route("/api/admin/bots/reset", post(reset_all_agents))
            // ヘルスチェック
            .route("/api/health", get(health_check))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Run the chat matching server
    ///
    /// # Arguments
    ///
    /// * `host` - The host address to bind to (e.g., "127.0.0.1")
    /// * `port` - The port number to bind to (e.g., 8080)
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let app = self.router();

        // Bind the server to the host and port
        let bind_addr = format!("{}:{}", host, port);
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

        // Start the server
        tracing::info!(
            "participant matching server listening on {}",
            listener.local_addr()?
        );
        tracing::info!("connect to: ws://{}/ws/chat/{{room_id}}/{{uid}}", bind_addr);
        tracing::info!("press Ctrl+C to shutdown gracefully");

        // Set up graceful shutdown signal handler
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("server shutdown complete");

        Ok(())
    }
}
