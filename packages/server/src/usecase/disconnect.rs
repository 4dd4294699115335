//! UseCase: 切断（teardown）処理
//!
//! 接続の終わり方（正常クローズ・エラー・タスク中断）によらず、必ず
//! 1回だけ実行される後片付けです。各ステップは冪等で、ストアや
//! ブローカーの失敗はログに残して後続のステップを続行します。
//!
//! ## 手順
//!
//! 1. ローカルレジストリから登録解除
//! 2. 共有ストアからメンバーシップを削除
//! 3. 削除後の人数で `user_offline` presence を発行
//! 4. オーナー離脱によるルーム破棄の判定
//! 5. ローカル接続が尽きていれば Relay Task を停止

use std::sync::Arc;

use crate::domain::{
    ConnectionMeta, Envelope, MessageBroker, PresenceEvent, RoomId, RoomStore,
};
use crate::infrastructure::ConnectionRegistry;
use utakata_shared::time::{get_utc_timestamp, timestamp_to_rfc3339};

use super::relay::RoomRelay;

/// 切断処理のユースケース
pub struct DisconnectUseCase {
    store: Arc<dyn RoomStore>,
    registry: Arc<ConnectionRegistry>,
    relay: Arc<RoomRelay>,
    broker: Arc<dyn MessageBroker>,
}

impl DisconnectUseCase {
    pub fn new(
        store: Arc<dyn RoomStore>,
        registry: Arc<ConnectionRegistry>,
        relay: Arc<RoomRelay>,
        broker: Arc<dyn MessageBroker>,
    ) -> Self {
        Self {
            store,
            registry,
            relay,
            broker,
        }
    }

    /// 後片付けを実行。失敗しても中断しない。
    pub async fn execute(&self, room_id: &RoomId, meta: &ConnectionMeta) {
        self.registry
            .deregister(room_id.as_str(), meta.id.as_str())
            .await;

        if let Err(e) = self
            .store
            .remove_member(room_id.as_str(), meta.id.as_str())
            .await
        {
            tracing::warn!(
                "Failed to remove member '{}' from room '{}': {}",
                meta.id.as_str(),
                room_id.as_str(),
                e
            );
        }

        self.announce_offline(room_id, meta).await;
        self.maybe_destroy_owner_room(room_id, meta).await;

        // レジストリの確認と停止は relay 側が同じロックの下で行う。
        // ここで確認してから止めると、合間に入室した接続が取り残される。
        self.relay.stop_if_idle(room_id.as_str()).await;

        tracing::info!(
            "Connection '{}' ('{}') left room '{}'",
            meta.id.as_str(),
            meta.display_name.as_str(),
            room_id.as_str()
        );
    }

    /// 退室の presence イベントを削除後の人数つきで発行する
    async fn announce_offline(&self, room_id: &RoomId, meta: &ConnectionMeta) {
        let online_count = match self.store.count_members(room_id.as_str()).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(
                    "Failed to count members of room '{}': {}",
                    room_id.as_str(),
                    e
                );
                return;
            }
        };
        let envelope = Envelope::presence(
            room_id,
            meta,
            PresenceEvent::UserOffline,
            online_count,
            timestamp_to_rfc3339(get_utc_timestamp()),
        );
        if let Err(e) = self
            .broker
            .publish(room_id.as_str(), &envelope.to_json())
            .await
        {
            tracing::warn!(
                "Failed to publish offline presence for room '{}': {}",
                room_id.as_str(),
                e
            );
        }
    }

    /// オーナーが離脱した場合のルーム破棄
    ///
    /// `destroy_on_owner_offline` フラグが立っていて、離脱したのがオーナー名の
    /// 接続なら、終了通知を流してからルームを削除する。
    async fn maybe_destroy_owner_room(&self, room_id: &RoomId, meta: &ConnectionMeta) {
        let room = match self.store.get_room(room_id.as_str()).await {
            Ok(Some(room)) => room,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("Failed to load room '{}': {}", room_id.as_str(), e);
                return;
            }
        };
        if !room.flags.destroy_on_owner_offline || !room.is_owner_name(&meta.display_name) {
            return;
        }

        let notice = Envelope::system_notice(
            room_id,
            "Room closed by owner".to_string(),
            timestamp_to_rfc3339(get_utc_timestamp()),
        );
        if let Err(e) = self
            .broker
            .publish(room_id.as_str(), &notice.to_json())
            .await
        {
            tracing::warn!(
                "Failed to publish close notice for room '{}': {}",
                room_id.as_str(),
                e
            );
        }
        if let Err(e) = self.store.delete_room(room_id.as_str()).await {
            tracing::warn!("Failed to delete room '{}': {}", room_id.as_str(), e);
        }
        tracing::info!(
            "Room '{}' destroyed after owner '{}' went offline",
            room_id.as_str(),
            meta.display_name.as_str()
        );
    }
}
