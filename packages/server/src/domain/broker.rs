//! MessageBroker trait 定義
//!
//! ルーム単位の pub/sub チャンネル（本番では Redis pub/sub 相当）への
//! インターフェースです。あるインスタンスが publish したメッセージは、
//! 同じルームを購読しているすべてのインスタンスの Relay Task に届きます。

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// ブローカー操作の失敗
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("subscription closed")]
    Closed,
}

/// ルームのチャンネルの購読ハンドル
#[async_trait]
pub trait Subscription: Send {
    /// 次のメッセージを最大 `timeout` まで待つ。
    ///
    /// タイムアウトは `Ok(None)`。Relay Task はこの境界ごとに
    /// 「ローカル接続が残っているか」を確認して生存判断を行う。
    async fn recv(&mut self, timeout: Duration) -> Result<Option<String>, BrokerError>;

    /// 購読を解除しブローカー側のリソースを解放する。
    ///
    /// 成功・エラー・キャンセルのどの経路から呼んでも安全。
    async fn close(&mut self);
}

/// Message Broker trait
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// ルームのチャンネルにペイロードを発行する
    async fn publish(&self, room_id: &str, payload: &str) -> Result<(), BrokerError>;

    /// ルームのチャンネルを購読する
    async fn subscribe(&self, room_id: &str) -> Result<Box<dyn Subscription>, BrokerError>;
}
