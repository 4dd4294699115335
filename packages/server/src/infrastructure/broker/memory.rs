//! InMemory MessageBroker 実装
//!
//! ドメイン層が定義する MessageBroker trait の具体的な実装。本番で想定する
//! Redis pub/sub（チャンネル名 `room:channel:{room_id}`）を、ルームごとの
//! tokio broadcast チャンネルで再現します。
//!
//! ハンドルは `Clone` 可能で、複数のサービスインスタンスが同じブローカーを
//! 共有できます。あるインスタンスの publish は、同じルームを購読している
//! すべてのインスタンスの Relay Task に届きます。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::sync::Mutex;

use crate::domain::{BrokerError, MessageBroker, Subscription};

/// ルームごとの broadcast チャンネルの容量
///
/// 溢れた購読者は Lagged を受け取り、失われた分はスキップされる。
const CHANNEL_CAPACITY: usize = 256;

/// インメモリ Message Broker 実装
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<String>>>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(&self, room_id: &str, payload: &str) -> Result<(), BrokerError> {
        let mut channels = self.channels.lock().await;
        // 購読者のいないルームへの publish は配信先が無いだけなので成功扱い。
        // チャンネルはここでは作らない。
        let Some(sender) = channels.get(room_id) else {
            return Ok(());
        };
        // 全購読者が離れたチャンネルはここで回収する
        if sender.receiver_count() == 0 {
            channels.remove(room_id);
            return Ok(());
        }
        let _ = sender.send(payload.to_string());
        Ok(())
    }

    async fn subscribe(&self, room_id: &str) -> Result<Box<dyn Subscription>, BrokerError> {
        let mut channels = self.channels.lock().await;
        let sender = channels
            .entry(room_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        Ok(Box::new(InMemorySubscription {
            room_id: room_id.to_string(),
            receiver: Some(sender.subscribe()),
        }))
    }
}

struct InMemorySubscription {
    room_id: String,
    receiver: Option<broadcast::Receiver<String>>,
}

#[async_trait]
impl Subscription for InMemorySubscription {
    async fn recv(&mut self, timeout: Duration) -> Result<Option<String>, BrokerError> {
        let receiver = self.receiver.as_mut().ok_or(BrokerError::Closed)?;
        match tokio::time::timeout(timeout, receiver.recv()).await {
            Ok(Ok(payload)) => Ok(Some(payload)),
            Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                tracing::warn!(
                    "Subscription for room '{}' lagged, skipped {} messages",
                    self.room_id,
                    skipped
                );
                Ok(None)
            }
            Ok(Err(broadcast::error::RecvError::Closed)) => Err(BrokerError::Closed),
            Err(_) => Ok(None),
        }
    }

    async fn close(&mut self) {
        // 二重 close も安全
        self.receiver.take();
    }
}
