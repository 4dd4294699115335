//! UseCase: 接続受付（admission）処理
//!
//! WebSocket ハンドシェイク後の入室判定と、成功時のセットアップ
//! （レジストリ登録、Relay Task 起動、メンバーシップ記録）を行います。
//!
//! ## 判定順序
//!
//! 1. ルームが存在するか
//! 2. 期限切れでないか（期限切れならここで削除する）
//! 3. パスワードが一致するか
//! 4. 定員に空きがあるか
//! 5. 表示名がルーム内で（大文字小文字を区別せず）未使用か
//!
//! この順序は観測可能な契約です。複数の拒否理由が同時に成り立つとき、
//! クライアントには先に該当した理由が返ります。

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{
    ConnectionIdFactory, ConnectionMeta, DisplayName, Envelope, MessageBroker, OnlineUser,
    PresenceEvent, PusherChannel, Room, RoomId, RoomStore,
};
use crate::infrastructure::ConnectionRegistry;
use utakata_shared::time::{get_utc_timestamp, timestamp_to_rfc3339};

use super::error::AdmissionError;
use super::relay::RoomRelay;

/// Relay Task の購読が確立するのを待つ猶予
///
/// ensure_running は購読確立後に返るが、別インスタンスの Relay が
/// まだ立ち上がり中の場合に welcome 直後のメッセージが落ちるのを防ぐ。
const RELAY_SUBSCRIBE_GRACE: Duration = Duration::from_millis(100);

/// 入室リクエストのパラメータ
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub room_id: String,
    pub display_name: Option<String>,
    pub password: Option<String>,
}

/// 入室に成功した接続
#[derive(Debug, Clone)]
pub struct AdmittedConnection {
    pub room: Room,
    pub meta: ConnectionMeta,
}

/// 接続受付のユースケース
pub struct ConnectUseCase {
    store: Arc<dyn RoomStore>,
    registry: Arc<ConnectionRegistry>,
    relay: Arc<RoomRelay>,
    broker: Arc<dyn MessageBroker>,
}

impl ConnectUseCase {
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

    /// 入室判定とセットアップを実行
    ///
    /// # Returns
    ///
    /// * `Ok(AdmittedConnection)` - 入室成功
    /// * `Err(AdmissionError)` - 入室拒否。Display がそのままクローズ理由になる
    pub async fn execute(
        &self,
        params: ConnectParams,
        sender: PusherChannel,
    ) -> Result<AdmittedConnection, AdmissionError> {
        let now = get_utc_timestamp();

        // 1. ルームの存在確認
        let room_id =
            RoomId::new(params.room_id).map_err(|_| AdmissionError::RoomNotFound)?;
        let room = self
            .store
            .get_room(room_id.as_str())
            .await?
            .ok_or(AdmissionError::RoomNotFound)?;

        // 2. 有効期限の確認。期限切れのルームはここで片付ける。
        if room.is_expired(now) {
            self.store.delete_room(room_id.as_str()).await?;
            return Err(AdmissionError::RoomExpired);
        }

        // 3. パスワードの確認
        if !room.verify_password(params.password.as_deref()) {
            return Err(AdmissionError::InvalidPassword);
        }

        // 4. 定員の確認（共有ストア上の人数が真実）
        let occupancy = self.store.count_members(room_id.as_str()).await?;
        if occupancy >= room.max_users {
            return Err(AdmissionError::RoomFull);
        }

        // 5. 表示名の一意性確認（大文字小文字を区別しない）
        let connection_id = ConnectionIdFactory::generate();
        let display_name = match params.display_name {
            Some(name) => DisplayName::new(name).map_err(AdmissionError::InvalidDisplayName)?,
            None => DisplayName::fallback(&connection_id),
        };
        let taken = self.store.list_display_names(room_id.as_str()).await?;
        if taken.contains(&display_name.folded()) {
            return Err(AdmissionError::DisplayNameTaken);
        }

        // 入室成功。ローカルレジストリに登録してから Relay を立ち上げ、
        // 最後に共有ストアへメンバーシップを記録する。
        let meta = ConnectionMeta::new(connection_id, display_name, now);
        self.registry.register(&room_id, &meta.id, sender).await;

        if let Err(e) = self.relay.ensure_running(&room_id).await {
            self.registry
                .deregister(room_id.as_str(), meta.id.as_str())
                .await;
            return Err(e.into());
        }
        tokio::time::sleep(RELAY_SUBSCRIBE_GRACE).await;

        // メンバーシップの TTL はルームの残り寿命に合わせる
        let member_ttl =
            Duration::from_millis(room.remaining_lifetime_millis(now).max(0) as u64);
        if let Err(e) = self
            .store
            .add_member(room_id.as_str(), meta.clone(), member_ttl)
            .await
        {
            self.registry
                .deregister(room_id.as_str(), meta.id.as_str())
                .await;
            return Err(e.into());
        }

        tracing::info!(
            "Connection '{}' ('{}') admitted to room '{}'",
            meta.id.as_str(),
            meta.display_name.as_str(),
            room_id.as_str()
        );
        Ok(AdmittedConnection { room, meta })
    }

    /// 入室直後のクライアントに返す welcome フレームを組み立てる
    ///
    /// オンライン一覧は接続時刻順（同時刻なら接続 ID 順）で返す。
    pub async fn welcome_envelope(
        &self,
        admitted: &AdmittedConnection,
    ) -> Result<Envelope, AdmissionError> {
        let mut members = self
            .store
            .list_members(admitted.room.id.as_str())
            .await?;
        members.sort_by(|a, b| {
            a.connected_at
                .cmp(&b.connected_at)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        let roster: Vec<OnlineUser> = members.iter().map(OnlineUser::from_meta).collect();
        Ok(Envelope::welcome(
            &admitted.room,
            &admitted.meta,
            roster,
            timestamp_to_rfc3339(get_utc_timestamp()),
        ))
    }

    /// 入室の presence イベントをルームのチャンネルに発行する
    pub async fn announce_online(
        &self,
        admitted: &AdmittedConnection,
    ) -> Result<(), AdmissionError> {
        let online_count = self
            .store
            .count_members(admitted.room.id.as_str())
            .await?;
        let envelope = Envelope::presence(
            &admitted.room.id,
            &admitted.meta,
            PresenceEvent::UserOnline,
            online_count,
            timestamp_to_rfc3339(get_utc_timestamp()),
        );
        self.broker
            .publish(admitted.room.id.as_str(), &envelope.to_json())
            .await?;
        Ok(())
    }
}
