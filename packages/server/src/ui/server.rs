//! Server execution logic.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::usecase::{
    CloseRoomUseCase, ConnectUseCase, CreateRoomUseCase, DisconnectUseCase, GetRoomDetailUseCase,
    PublishMessageUseCase,
};

use super::{
    handler::{close_room, create_room, get_room_detail, health_check, websocket_handler},
    signal::shutdown_signal,
    state::AppState,
};

/// Room messaging server
///
/// This struct encapsulates the server configuration and provides methods to run the server.
///
/// # Example
///
/// ```ignore
/// let server = Server::new(
///     connect_usecase,
///     disconnect_usecase,
///     publish_message_usecase,
///     create_room_usecase,
///     get_room_detail_usecase,
///     close_room_usecase,
/// );
/// server.run("127.0.0.1".to_string(), 8080).await?;
/// ```
pub struct Server {
    /// ConnectUseCase（接続受付のユースケース）
    connect_usecase: Arc<ConnectUseCase>,
    /// DisconnectUseCase（切断処理のユースケース）
    disconnect_usecase: Arc<DisconnectUseCase>,
    /// PublishMessageUseCase（メッセージ発行のユースケース）
    publish_message_usecase: Arc<PublishMessageUseCase>,
    /// CreateRoomUseCase（ルーム作成のユースケース）
    create_room_usecase: Arc<CreateRoomUseCase>,
    /// GetRoomDetailUseCase（ルーム詳細照会のユースケース）
    get_room_detail_usecase: Arc<GetRoomDetailUseCase>,
    /// CloseRoomUseCase（ルームの明示クローズのユースケース）
    close_room_usecase: Arc<CloseRoomUseCase>,
}

impl Server {
    /// Create a new Server instance
    pub fn new(
        connect_usecase: Arc<ConnectUseCase>,
        disconnect_usecase: Arc<DisconnectUseCase>,
        publish_message_usecase: Arc<PublishMessageUseCase>,
        create_room_usecase: Arc<CreateRoomUseCase>,
        get_room_detail_usecase: Arc<GetRoomDetailUseCase>,
        close_room_usecase: Arc<CloseRoomUseCase>,
    ) -> Self {
        Self {
            connect_usecase,
            disconnect_usecase,
            publish_message_usecase,
            create_room_usecase,
            get_room_detail_usecase,
            close_room_usecase,
        }
    }

    /// Run the room messaging server
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
        let app_state = Arc::new(AppState {
            connect_usecase: self.connect_usecase,
            disconnect_usecase: self.disconnect_usecase,
            publish_message_usecase: self.publish_message_usecase,
            create_room_usecase: self.create_room_usecase,
            get_room_detail_usecase: self.get_room_detail_usecase,
            close_room_usecase: self.close_room_usecase,
        });

        // Define handlers
        let app = Router::new()
            // ルーム管理 HTTP エンドポイント
            .route("/rooms", post(create_room))
            .route("/rooms/{room_id}", get(get_room_detail))
            .route("/rooms/{room_id}/close", post(close_room))
            // WebSocket エンドポイント
            .route("/rooms/{room_id}/ws", get(websocket_handler))
            // ヘルスチェック
            .route("/api/health", get(health_check))
            .layer(TraceLayer::new_for_http())
            .with_state(app_state);

        // Bind the server to the host and port
        let bind_addr = format!("{}:{}", host, port);
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

        // Start the server
        tracing::info!(
            "Room messaging server listening on {}",
            listener.local_addr()?
        );
        tracing::info!("Connect to: ws://{}/rooms/{{room_id}}/ws", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        // ConnectInfo is required to capture the caller's address as owner address
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        tracing::info!("Server shutdown complete");

        Ok(())
    }
}
