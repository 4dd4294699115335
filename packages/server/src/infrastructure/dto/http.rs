//! HTTP API request / response DTOs.

use serde::{Deserialize, Serialize};

use crate::domain::ConnectionMeta;
use crate::usecase::RoomDetail;
use utakata_shared::time::timestamp_to_rfc3339;

/// Request body for `POST /rooms`. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Room lifetime in seconds.
    #[serde(default)]
    pub expiry_seconds: Option<u64>,
    #[serde(default)]
    pub max_users: Option<usize>,
    #[serde(default)]
    pub owner_name: Option<String>,
    #[serde(default)]
    pub destroy_on_owner_offline: Option<bool>,
}

/// Response body for `POST /rooms`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateRoomResponse {
    pub room_id: String,
    pub ws_url: String,
    /// Expiry time (RFC 3339).
    pub expires_at: String,
}

/// Online user entry in `GET /rooms/{room_id}`.
#[derive(Debug, Clone, Serialize)]
pub struct OnlineUserDto {
    pub connection_id: String,
    pub display_name: String,
    /// Connection time (RFC 3339).
    pub connected_at: String,
}

impl From<&ConnectionMeta> for OnlineUserDto {
    fn from(meta: &ConnectionMeta) -> Self {
        Self {
            connection_id: meta.id.as_str().to_string(),
            display_name: meta.display_name.as_str().to_string(),
            connected_at: timestamp_to_rfc3339(meta.connected_at),
        }
    }
}

/// Response body for `GET /rooms/{room_id}`.
#[derive(Debug, Clone, Serialize)]
pub struct RoomDetailResponse {
    pub room_id: String,
    pub name: String,
    /// Creation time (RFC 3339).
    pub created_at: String,
    /// Expiry time (RFC 3339).
    pub expires_at: String,
    pub max_users: usize,
    pub online_users_count: usize,
    pub online_users: Vec<OnlineUserDto>,
    pub owner_name: Option<String>,
    pub has_password: bool,
    pub is_expired: bool,
    pub is_full: bool,
}

impl From<RoomDetail> for RoomDetailResponse {
    fn from(detail: RoomDetail) -> Self {
        Self {
            room_id: detail.room.id.as_str().to_string(),
            name: detail.room.name.clone(),
            created_at: timestamp_to_rfc3339(detail.room.created_at),
            expires_at: timestamp_to_rfc3339(detail.room.expires_at),
            max_users: detail.room.max_users,
            online_users_count: detail.members.len(),
            online_users: detail.members.iter().map(OnlineUserDto::from).collect(),
            owner_name: detail.room.owner_name.clone(),
            has_password: detail.room.has_password(),
            is_expired: detail.is_expired,
            is_full: detail.is_full,
        }
    }
}

/// Response body for `POST /rooms/{room_id}/close`.
#[derive(Debug, Clone, Serialize)]
pub struct CloseRoomResponse {
    pub room_id: String,
    pub closed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConnectionId, DisplayName, Room, RoomFlags, RoomId};

    fn test_room() -> Room {
        Room {
            id: RoomId::new("room-1".to_string()).unwrap(),
            name: "tea-room".to_string(),
            created_at: 0,
            expires_at: 600_000,
            max_users: 2,
            password: Some("secret".to_string()),
            owner_name: Some("alice".to_string()),
            owner_addr: None,
            flags: RoomFlags::default(),
        }
    }

    fn test_meta(name: &str) -> ConnectionMeta {
        ConnectionMeta::new(
            ConnectionId::new(format!("conn-{name}")).unwrap(),
            DisplayName::new(name.to_string()).unwrap(),
            1_000,
        )
    }

    #[test]
    fn test_create_room_request_accepts_empty_body() {
        // テスト項目: 全フィールド省略のリクエストボディがデコードできる
        // given (前提条件):
        let json = "{}";

        // when (操作):
        let request: CreateRoomRequest = serde_json::from_str(json).unwrap();

        // then (期待する結果):
        assert_eq!(request.name, None);
        assert_eq!(request.expiry_seconds, None);
        assert_eq!(request.max_users, None);
    }

    #[test]
    fn test_room_detail_response_from_detail() {
        // テスト項目: RoomDetail から HTTP レスポンス DTO が組み立てられる
        // given (前提条件):
        let detail = RoomDetail {
            room: test_room(),
            members: vec![test_meta("alice"), test_meta("bob")],
            is_expired: false,
            is_full: true,
        };

        // when (操作):
        let response = RoomDetailResponse::from(detail);

        // then (期待する結果):
        assert_eq!(response.room_id, "room-1");
        assert_eq!(response.online_users_count, 2);
        assert!(response.has_password);
        assert!(response.is_full);
        assert!(!response.is_expired);
        assert_eq!(response.online_users[0].connected_at.len(), 25);
    }
}
