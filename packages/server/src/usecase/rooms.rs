//! UseCase: ルーム管理（作成・照会・明示クローズ）
//!
//! HTTP API の背後にあるビジネスロジックです。ルームは共有ストアに
//! 有効期限 = TTL で保存され、寿命が尽きれば自然に消えます。

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{
    ConnectionMeta, Envelope, MessageBroker, Room, RoomFlags, RoomIdFactory, RoomStore,
};
use utakata_shared::time::{get_utc_timestamp, timestamp_to_rfc3339};

use super::error::{CloseRoomError, CreateRoomError, GetRoomDetailError};

/// ルーム寿命のデフォルト（秒）
pub const DEFAULT_EXPIRY_SECONDS: u64 = 600;

/// 最大同時接続数のデフォルト
pub const DEFAULT_MAX_USERS: usize = 20;

/// ルーム作成の入力
#[derive(Debug, Clone, Default)]
pub struct CreateRoomInput {
    pub name: Option<String>,
    pub password: Option<String>,
    pub expiry_seconds: Option<u64>,
    pub max_users: Option<usize>,
    pub owner_name: Option<String>,
    pub owner_addr: Option<String>,
    pub destroy_on_owner_offline: Option<bool>,
}

/// ルーム作成のユースケース
pub struct CreateRoomUseCase {
    store: Arc<dyn RoomStore>,
}

impl CreateRoomUseCase {
    pub fn new(store: Arc<dyn RoomStore>) -> Self {
        Self { store }
    }

    /// ルームを作成して共有ストアに保存する
    pub async fn execute(&self, input: CreateRoomInput) -> Result<Room, CreateRoomError> {
        let now = get_utc_timestamp();
        let expiry_seconds = input.expiry_seconds.unwrap_or(DEFAULT_EXPIRY_SECONDS).max(1);
        let id = RoomIdFactory::generate();
        let name = match input.name.filter(|name| !name.trim().is_empty()) {
            Some(name) => name.trim().to_string(),
            None => {
                let tail: String = id.as_str().chars().take(8).collect();
                format!("room-{tail}")
            }
        };
        let room = Room {
            id,
            name,
            created_at: now,
            expires_at: now + (expiry_seconds as i64) * 1_000,
            max_users: input.max_users.unwrap_or(DEFAULT_MAX_USERS).max(1),
            password: input.password.filter(|password| !password.is_empty()),
            owner_name: input.owner_name,
            owner_addr: input.owner_addr,
            flags: RoomFlags {
                destroy_on_owner_offline: input.destroy_on_owner_offline.unwrap_or(false),
            },
        };
        self.store
            .create_room(room.clone(), Duration::from_secs(expiry_seconds))
            .await?;
        tracing::info!(
            "Room '{}' ('{}') created, expires in {}s",
            room.id.as_str(),
            room.name,
            expiry_seconds
        );
        Ok(room)
    }
}

/// ルームの詳細（HTTP レスポンスの材料）
#[derive(Debug, Clone)]
pub struct RoomDetail {
    pub room: Room,
    pub members: Vec<ConnectionMeta>,
    pub is_expired: bool,
    pub is_full: bool,
}

/// ルーム詳細照会のユースケース
pub struct GetRoomDetailUseCase {
    store: Arc<dyn RoomStore>,
}

impl GetRoomDetailUseCase {
    pub fn new(store: Arc<dyn RoomStore>) -> Self {
        Self { store }
    }

    pub async fn execute(&self, room_id: &str) -> Result<RoomDetail, GetRoomDetailError> {
        let room = self
            .store
            .get_room(room_id)
            .await?
            .ok_or(GetRoomDetailError::RoomNotFound)?;
        let mut members = self.store.list_members(room_id).await?;
        members.sort_by(|a, b| {
            a.connected_at
                .cmp(&b.connected_at)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        let now = get_utc_timestamp();
        let is_expired = room.is_expired(now);
        let is_full = members.len() >= room.max_users;
        Ok(RoomDetail {
            room,
            members,
            is_expired,
            is_full,
        })
    }
}

/// ルームの明示クローズのユースケース
///
/// 作成元アドレスが一致する呼び出しだけがルームを閉じられる。
pub struct CloseRoomUseCase {
    store: Arc<dyn RoomStore>,
    broker: Arc<dyn MessageBroker>,
}

impl CloseRoomUseCase {
    pub fn new(store: Arc<dyn RoomStore>, broker: Arc<dyn MessageBroker>) -> Self {
        Self { store, broker }
    }

    pub async fn execute(
        &self,
        room_id: &str,
        requester_addr: Option<&str>,
    ) -> Result<(), CloseRoomError> {
        let room = self
            .store
            .get_room(room_id)
            .await?
            .ok_or(CloseRoomError::RoomNotFound)?;
        if let Some(owner_addr) = room.owner_addr.as_deref() {
            if requester_addr != Some(owner_addr) {
                return Err(CloseRoomError::NotOwner);
            }
        }

        // 終了通知を流してから削除する。通知の失敗は削除を妨げない。
        let notice = Envelope::system_notice(
            &room.id,
            "Room closed by owner".to_string(),
            timestamp_to_rfc3339(get_utc_timestamp()),
        );
        if let Err(e) = self.broker.publish(room_id, &notice.to_json()).await {
            tracing::warn!("Failed to publish close notice for room '{}': {}", room_id, e);
        }
        self.store.delete_room(room_id).await?;
        tracing::info!("Room '{}' explicitly closed", room_id);
        Ok(())
    }
}
