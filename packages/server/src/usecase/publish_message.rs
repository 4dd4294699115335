//! UseCase: メッセージ発行処理
//!
//! クライアントから受け取った本文を正規形の Envelope に包んで
//! ルームのチャンネルに発行します。`connection_id` / `room_id` /
//! `timestamp` / `display_name` はすべてサーバー側で埋めるため、
//! クライアントが他の接続になりすますことはできません。

use std::sync::Arc;

use crate::domain::{ConnectionMeta, Envelope, MessageBroker, RoomId, RoomStore};
use utakata_shared::time::{get_utc_timestamp, timestamp_to_rfc3339};

use super::error::PublishError;

/// メッセージ発行のユースケース
pub struct PublishMessageUseCase {
    store: Arc<dyn RoomStore>,
    broker: Arc<dyn MessageBroker>,
}

impl PublishMessageUseCase {
    pub fn new(store: Arc<dyn RoomStore>, broker: Arc<dyn MessageBroker>) -> Self {
        Self { store, broker }
    }

    /// メッセージ発行を実行
    ///
    /// 発行のたびにルームの生存を確認する。消えていたり期限切れなら
    /// `RoomGone` を返し、呼び出し側は接続を閉じるべき。
    pub async fn execute(
        &self,
        room_id: &RoomId,
        meta: &ConnectionMeta,
        text: String,
    ) -> Result<(), PublishError> {
        let now = get_utc_timestamp();
        let room = self
            .store
            .get_room(room_id.as_str())
            .await?
            .ok_or(PublishError::RoomGone)?;
        if room.is_expired(now) {
            self.store.delete_room(room_id.as_str()).await?;
            return Err(PublishError::RoomGone);
        }

        let envelope = Envelope::chat(room_id, meta, text, timestamp_to_rfc3339(now));
        self.broker
            .publish(room_id.as_str(), &envelope.to_json())
            .await?;
        tracing::debug!(
            "Connection '{}' published a message to room '{}'",
            meta.id.as_str(),
            room_id.as_str()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ConnectionIdFactory, DisplayName, Room, RoomFlags, RoomIdFactory, Subscription as _,
    };
    use crate::infrastructure::{InMemoryBroker, InMemoryRoomStore};
    use std::time::Duration;

    fn fixture() -> (InMemoryRoomStore, InMemoryBroker, PublishMessageUseCase) {
        let store = InMemoryRoomStore::new();
        let broker = InMemoryBroker::new();
        let usecase =
            PublishMessageUseCase::new(Arc::new(store.clone()), Arc::new(broker.clone()));
        (store, broker, usecase)
    }

    fn test_room() -> Room {
        let now = get_utc_timestamp();
        Room {
            id: RoomIdFactory::generate(),
            name: "test-room".to_string(),
            created_at: now,
            expires_at: now + 600_000,
            max_users: 20,
            password: None,
            owner_name: None,
            owner_addr: None,
            flags: RoomFlags::default(),
        }
    }

    fn test_meta(name: &str) -> ConnectionMeta {
        ConnectionMeta::new(
            ConnectionIdFactory::generate(),
            DisplayName::new(name.to_string()).unwrap(),
            get_utc_timestamp(),
        )
    }

    #[tokio::test]
    async fn test_publish_wraps_text_in_chat_envelope() {
        // テスト項目: 本文がサーバー側のメタデータつき Envelope で発行される
        // given (前提条件):
        let (store, broker, usecase) = fixture();
        let room = test_room();
        store
            .create_room(room.clone(), Duration::from_secs(600))
            .await
            .unwrap();
        let meta = test_meta("alice");
        let mut subscription = broker.subscribe(room.id.as_str()).await.unwrap();

        // when (操作):
        usecase
            .execute(&room.id, &meta, "hello".to_string())
            .await
            .unwrap();

        // then (期待する結果):
        let payload = subscription
            .recv(Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        match serde_json::from_str::<Envelope>(&payload).unwrap() {
            Envelope::Message {
                room_id,
                connection_id,
                display_name,
                text,
                timestamp,
            } => {
                assert_eq!(room_id, room.id.as_str());
                assert_eq!(connection_id, meta.id.as_str());
                assert_eq!(display_name, Some("alice".to_string()));
                assert_eq!(text, "hello");
                assert!(!timestamp.is_empty());
            }
            other => panic!("unexpected envelope: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_publish_to_missing_room_fails() {
        // テスト項目: 消えたルームへの発行が RoomGone になる
        // given (前提条件):
        let (_store, _broker, usecase) = fixture();
        let room = test_room();
        let meta = test_meta("alice");

        // when (操作):
        let result = usecase.execute(&room.id, &meta, "hello".to_string()).await;

        // then (期待する結果):
        assert!(matches!(result, Err(PublishError::RoomGone)));
    }

    #[tokio::test]
    async fn test_publish_to_expired_room_fails_and_deletes_it() {
        // テスト項目: 期限切れルームへの発行が拒否され、ルームが削除される
        // given (前提条件):
        let (store, _broker, usecase) = fixture();
        let mut room = test_room();
        room.expires_at = get_utc_timestamp() - 1_000;
        store
            .create_room(room.clone(), Duration::from_secs(600))
            .await
            .unwrap();
        let meta = test_meta("alice");

        // when (操作):
        let result = usecase.execute(&room.id, &meta, "hello".to_string()).await;

        // then (期待する結果):
        assert!(matches!(result, Err(PublishError::RoomGone)));
        assert_eq!(store.get_room(room.id.as_str()).await.unwrap(), None);
    }
}
