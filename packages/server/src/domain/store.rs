//! RoomStore trait 定義
//!
//! ルームのメタデータとメンバーシップを保持する共有ストア
//! （本番では Redis 相当）へのインターフェースです。
//! UseCase 層はこの trait に依存し、Infrastructure 層の具体的な実装には
//! 依存しません（依存性の逆転）。
//!
//! すべての操作は冪等です。マルチキーのトランザクションは仮定しないため、
//! 呼び出し側は短い stale（定員チェックと同時入室の競合など）を許容します。

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::connection::ConnectionMeta;
use super::room::Room;

/// ストア操作の失敗
#[derive(Debug, Error)]
pub enum StoreError {
    /// 依存先が利用できない。呼び出し側の境界に伝播させ、
    /// 再接続やバックオフの判断は外側に委ねる。
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Room Store trait
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// ルームを TTL つきで保存する
    async fn create_room(&self, room: Room, ttl: Duration) -> Result<(), StoreError>;

    /// ルームのメタデータを取得する（存在しなければ None）
    async fn get_room(&self, room_id: &str) -> Result<Option<Room>, StoreError>;

    /// ルームとそのメンバーシップを削除する（冪等）
    async fn delete_room(&self, room_id: &str) -> Result<(), StoreError>;

    /// 接続をルームのメンバーに加え、メタデータを TTL つきで記録する
    async fn add_member(
        &self,
        room_id: &str,
        meta: ConnectionMeta,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// 接続をルームのメンバーから外す（冪等）
    async fn remove_member(&self, room_id: &str, connection_id: &str) -> Result<(), StoreError>;

    /// ルームの現在のメンバー一覧を取得する
    async fn list_members(&self, room_id: &str) -> Result<Vec<ConnectionMeta>, StoreError>;

    /// ルームの現在のメンバー数を取得する
    async fn count_members(&self, room_id: &str) -> Result<usize, StoreError>;

    /// ルーム内の表示名の集合を取得する（大文字小文字を区別しない正規化形）
    async fn list_display_names(&self, room_id: &str) -> Result<HashSet<String>, StoreError>;
}
