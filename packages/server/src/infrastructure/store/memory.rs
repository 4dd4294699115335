//! InMemory RoomStore 実装
//!
//! ドメイン層が定義する RoomStore trait の具体的な実装。本番で想定する
//! Redis のキースペース（`room:meta:*` / `room:users:*` / `conn:*`）を、
//! プロセス内の HashMap と `Instant` ベースの TTL で再現します。
//! 期限切れのエントリは読み出し時に遅延削除されます。
//!
//! ハンドルは `Clone` 可能で、複数のサービスインスタンスが同じストアを
//! 共有できます（テストでのマルチインスタンス構成）。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{ConnectionMeta, Room, RoomStore, StoreError};

/// TTL つきのエントリ
struct Expiring<T> {
    value: T,
    deadline: Instant,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            deadline: Instant::now() + ttl,
        }
    }

    fn alive(&self, now: Instant) -> bool {
        now < self.deadline
    }
}

#[derive(Default)]
struct Inner {
    rooms: HashMap<String, Expiring<Room>>,
    members: HashMap<String, HashMap<String, Expiring<ConnectionMeta>>>,
}

impl Inner {
    /// 期限切れメンバーを除去し、ルームの生きているメンバーへの参照を返す
    ///
    /// 全員が期限切れならルームのキーごと落とす（`remove_member` と同じ扱い）。
    fn live_members(&mut self, room_id: &str) -> Vec<&ConnectionMeta> {
        let now = Instant::now();
        let empty = match self.members.get_mut(room_id) {
            Some(members) => {
                members.retain(|_, member| member.alive(now));
                members.is_empty()
            }
            None => return Vec::new(),
        };
        if empty {
            self.members.remove(room_id);
            return Vec::new();
        }
        self.members
            .get(room_id)
            .map(|members| members.values().map(|member| &member.value).collect())
            .unwrap_or_default()
    }
}

/// インメモリ Room Store 実装
#[derive(Clone, Default)]
pub struct InMemoryRoomStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomStore for InMemoryRoomStore {
    async fn create_room(&self, room: Room, ttl: Duration) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner
            .rooms
            .insert(room.id.as_str().to_string(), Expiring::new(room, ttl));
        Ok(())
    }

    async fn get_room(&self, room_id: &str) -> Result<Option<Room>, StoreError> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let alive = inner.rooms.get(room_id).map(|room| room.alive(now));
        match alive {
            Some(true) => Ok(inner.rooms.get(room_id).map(|room| room.value.clone())),
            Some(false) => {
                // TTL 切れ: ルームとメンバーシップをまとめて落とす
                inner.rooms.remove(room_id);
                inner.members.remove(room_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete_room(&self, room_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.rooms.remove(room_id);
        inner.members.remove(room_id);
        Ok(())
    }

    async fn add_member(
        &self,
        room_id: &str,
        meta: ConnectionMeta,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner
            .members
            .entry(room_id.to_string())
            .or_default()
            .insert(meta.id.as_str().to_string(), Expiring::new(meta, ttl));
        Ok(())
    }

    async fn remove_member(&self, room_id: &str, connection_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(members) = inner.members.get_mut(room_id) {
            members.remove(connection_id);
            if members.is_empty() {
                inner.members.remove(room_id);
            }
        }
        Ok(())
    }

    async fn list_members(&self, room_id: &str) -> Result<Vec<ConnectionMeta>, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner
            .live_members(room_id)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn count_members(&self, room_id: &str) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.live_members(room_id).len())
    }

    async fn list_display_names(&self, room_id: &str) -> Result<HashSet<String>, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner
            .live_members(room_id)
            .into_iter()
            .map(|member| member.display_name.folded())
            .collect())
    }
}
