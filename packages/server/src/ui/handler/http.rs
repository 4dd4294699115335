//! HTTP API endpoint handlers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json,
    extract::{ConnectInfo, Path, State},
    http::StatusCode,
};

use crate::{
    infrastructure::dto::http::{
        CloseRoomResponse, CreateRoomRequest, CreateRoomResponse, RoomDetailResponse,
    },
    ui::state::AppState,
    usecase::{CloseRoomError, CreateRoomInput, GetRoomDetailError},
};
use utakata_shared::time::timestamp_to_rfc3339;

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Create a new room
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<CreateRoomResponse>), StatusCode> {
    let input = CreateRoomInput {
        name: body.name,
        password: body.password,
        expiry_seconds: body.expiry_seconds,
        max_users: body.max_users,
        owner_name: body.owner_name,
        owner_addr: Some(addr.ip().to_string()),
        destroy_on_owner_offline: body.destroy_on_owner_offline,
    };

    match state.create_room_usecase.execute(input).await {
        Ok(room) => {
            let response = CreateRoomResponse {
                room_id: room.id.as_str().to_string(),
                ws_url: ws_url(room.id.as_str()),
                expires_at: timestamp_to_rfc3339(room.expires_at),
            };
            Ok((StatusCode::CREATED, Json(response)))
        }
        Err(e) => {
            tracing::error!("Failed to create room: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Get room detail by ID
pub async fn get_room_detail(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomDetailResponse>, StatusCode> {
    match state.get_room_detail_usecase.execute(&room_id).await {
        Ok(detail) => Ok(Json(RoomDetailResponse::from(detail))),
        Err(GetRoomDetailError::RoomNotFound) => Err(StatusCode::NOT_FOUND),
        Err(GetRoomDetailError::Store(e)) => {
            tracing::error!("Failed to get room detail for '{}': {}", room_id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Close a room. Only the address that created the room may close it.
pub async fn close_room(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(room_id): Path<String>,
) -> Result<Json<CloseRoomResponse>, StatusCode> {
    match state
        .close_room_usecase
        .execute(&room_id, Some(&addr.ip().to_string()))
        .await
    {
        Ok(()) => Ok(Json(CloseRoomResponse {
            room_id,
            closed: true,
        })),
        Err(CloseRoomError::RoomNotFound) => Err(StatusCode::NOT_FOUND),
        Err(CloseRoomError::NotOwner) => Err(StatusCode::FORBIDDEN),
        Err(CloseRoomError::Store(e)) => {
            tracing::error!("Failed to close room '{}': {}", room_id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Build the public WebSocket URL for a room.
///
/// The public host is taken from the `DOMAIN` environment variable so the
/// URL survives reverse proxies.
fn ws_url(room_id: &str) -> String {
    let domain = std::env::var("DOMAIN").unwrap_or_else(|_| "localhost:8080".to_string());
    format!("ws://{domain}/rooms/{room_id}/ws")
}
