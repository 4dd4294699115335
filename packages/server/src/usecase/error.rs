//! UseCase 層のエラー型
//!
//! 入室拒否のエラーはそのまま WebSocket のクローズ理由としてクライアントに
//! 渡されるため、Display 実装が人間可読な文言になっています。

use thiserror::Error;

use crate::domain::{BrokerError, DomainError, StoreError};

/// 入室（admission）の失敗
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("Room not found")]
    RoomNotFound,

    #[error("Room expired")]
    RoomExpired,

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Room is full")]
    RoomFull,

    #[error("Display name already taken")]
    DisplayNameTaken,

    #[error("Invalid display name")]
    InvalidDisplayName(#[source] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// メッセージ発行の失敗
#[derive(Debug, Error)]
pub enum PublishError {
    /// ルームが削除済み、または期限切れになった。
    /// 呼び出し側はこの接続を閉じるべき。
    #[error("Room no longer exists")]
    RoomGone,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// ルーム作成の失敗
#[derive(Debug, Error)]
pub enum CreateRoomError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// ルーム詳細取得の失敗
#[derive(Debug, Error)]
pub enum GetRoomDetailError {
    #[error("Room not found")]
    RoomNotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// ルームの明示的クローズの失敗
#[derive(Debug, Error)]
pub enum CloseRoomError {
    #[error("Room not found")]
    RoomNotFound,

    #[error("Only the room owner can close the room")]
    NotOwner,

    #[error(transparent)]
    Store(#[from] StoreError),
}
