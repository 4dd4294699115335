//! Connection Registry
//!
//! このインスタンスに物理的に接続している WebSocket の送信ハンドルを
//! ルーム単位で保持します。プロセス内メモリのみで、インスタンス間では
//! 決して共有されません。
//!
//! ## 設計ノート
//!
//! Relay Task のファンアウトは `snapshot()` で取得した複製ハンドルに対して
//! 行い、ロックを保持したまま送信しません。送信失敗した接続の除去は
//! 反復後のまとめた `deregister` で行うため、反復中のレジストリ変更は
//! 起こりません。

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::domain::{ConnectionId, PusherChannel, RoomId};

/// このインスタンスの接続レジストリ
///
/// Key: room_id → (connection_id → 送信チャンネル)
#[derive(Default)]
pub struct ConnectionRegistry {
    rooms: Mutex<HashMap<String, HashMap<String, PusherChannel>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 接続を登録する
    pub async fn register(
        &self,
        room_id: &RoomId,
        connection_id: &ConnectionId,
        sender: PusherChannel,
    ) {
        let mut rooms = self.rooms.lock().await;
        rooms
            .entry(room_id.as_str().to_string())
            .or_default()
            .insert(connection_id.as_str().to_string(), sender);
        tracing::debug!(
            "Connection '{}' registered in room '{}'",
            connection_id.as_str(),
            room_id.as_str()
        );
    }

    /// 接続の登録を解除する。存在しない場合も何もしない（冪等）。
    pub async fn deregister(&self, room_id: &str, connection_id: &str) {
        let mut rooms = self.rooms.lock().await;
        if let Some(connections) = rooms.get_mut(room_id) {
            connections.remove(connection_id);
            if connections.is_empty() {
                rooms.remove(room_id);
            }
        }
        tracing::debug!(
            "Connection '{}' deregistered from room '{}'",
            connection_id,
            room_id
        );
    }

    /// ルームのローカル接続数
    pub async fn count(&self, room_id: &str) -> usize {
        let rooms = self.rooms.lock().await;
        rooms.get(room_id).map_or(0, HashMap::len)
    }

    /// ルームにローカル接続が1つも無いか
    pub async fn is_empty(&self, room_id: &str) -> bool {
        self.count(room_id).await == 0
    }

    /// 現在の送信ハンドルのスナップショットを返す
    pub async fn snapshot(&self, room_id: &str) -> Vec<(String, PusherChannel)> {
        let rooms = self.rooms.lock().await;
        rooms
            .get(room_id)
            .map(|connections| {
                connections
                    .iter()
                    .map(|(id, sender)| (id.clone(), sender.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}
