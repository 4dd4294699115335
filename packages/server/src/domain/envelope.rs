//! ワイヤ上のメッセージ Envelope
//!
//! ブローカーを流れる published message と、クライアントへ送る
//! アウトバウンドフレームは同じ正規形の JSON Envelope です。
//! `type` でタグ付けされたバリアントとしてモデル化し、欠損フィールドは
//! デフォルトで埋めて防御的にデコードします（欠損は決して致命傷にしない）。

use serde::{Deserialize, Serialize};

use super::connection::ConnectionMeta;
use super::room::{Room, RoomId};

/// presence イベントの種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceEvent {
    UserOnline,
    UserOffline,
}

/// welcome フレームに載せるオンラインユーザー情報
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineUser {
    #[serde(default)]
    pub connection_id: String,
    #[serde(default)]
    pub display_name: String,
    /// 接続時刻（RFC 3339）
    #[serde(default)]
    pub connected_at: String,
}

impl OnlineUser {
    pub fn from_meta(meta: &ConnectionMeta) -> Self {
        Self {
            connection_id: meta.id.as_str().to_string(),
            display_name: meta.display_name.as_str().to_string(),
            connected_at: utakata_shared::time::timestamp_to_rfc3339(meta.connected_at),
        }
    }
}

/// 正規形のメッセージ Envelope
///
/// すべてのバリアントが共通で `room_id` / `connection_id` / `timestamp`
/// （RFC 3339）を持ち、種別ごとのフィールドが加わる。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// サーバー発の通知。welcome フレームはオンライン一覧と人数を伴う。
    System {
        #[serde(default)]
        room_id: String,
        #[serde(default)]
        connection_id: String,
        #[serde(default)]
        timestamp: String,
        #[serde(default)]
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        online_users: Option<Vec<OnlineUser>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        online_count: Option<usize>,
    },
    /// 通常のチャットメッセージ
    Message {
        #[serde(default)]
        room_id: String,
        #[serde(default)]
        connection_id: String,
        #[serde(default)]
        timestamp: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
        #[serde(default)]
        text: String,
    },
    /// 入退室の presence イベント（現在のオンライン人数つき）
    Presence {
        #[serde(default)]
        room_id: String,
        #[serde(default)]
        connection_id: String,
        #[serde(default)]
        timestamp: String,
        event: PresenceEvent,
        #[serde(default)]
        display_name: String,
        #[serde(default)]
        online_count: usize,
    },
}

impl Envelope {
    /// チャットメッセージの Envelope を組み立てる
    pub fn chat(room_id: &RoomId, meta: &ConnectionMeta, text: String, timestamp: String) -> Self {
        Self::Message {
            room_id: room_id.as_str().to_string(),
            connection_id: meta.id.as_str().to_string(),
            timestamp,
            display_name: Some(meta.display_name.as_str().to_string()),
            text,
        }
    }

    /// サーバー発の通知（接続に紐付かないため connection_id は空）
    pub fn system_notice(room_id: &RoomId, message: String, timestamp: String) -> Self {
        Self::System {
            room_id: room_id.as_str().to_string(),
            connection_id: String::new(),
            timestamp,
            message,
            online_users: None,
            online_count: None,
        }
    }

    /// 入室直後のクライアントに返す welcome フレーム
    pub fn welcome(
        room: &Room,
        meta: &ConnectionMeta,
        online_users: Vec<OnlineUser>,
        timestamp: String,
    ) -> Self {
        let online_count = online_users.len();
        Self::System {
            room_id: room.id.as_str().to_string(),
            connection_id: meta.id.as_str().to_string(),
            timestamp,
            message: format!("Welcome to {}", room.name),
            online_users: Some(online_users),
            online_count: Some(online_count),
        }
    }

    /// presence イベントの Envelope を組み立てる
    pub fn presence(
        room_id: &RoomId,
        meta: &ConnectionMeta,
        event: PresenceEvent,
        online_count: usize,
        timestamp: String,
    ) -> Self {
        Self::Presence {
            room_id: room_id.as_str().to_string(),
            connection_id: meta.id.as_str().to_string(),
            timestamp,
            event,
            display_name: meta.display_name.as_str().to_string(),
            online_count,
        }
    }

    pub fn room_id(&self) -> &str {
        match self {
            Self::System { room_id, .. }
            | Self::Message { room_id, .. }
            | Self::Presence { room_id, .. } => room_id,
        }
    }

    /// ログ用の種別ラベル
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::Message { .. } => "message",
            Self::Presence { .. } => "presence",
        }
    }

    /// 正規形の JSON 文字列にシリアライズする
    pub fn to_json(&self) -> String {
        // Envelope は JSON で表現できるフィールドしか持たない
        serde_json::to_string(self).expect("envelope serialization cannot fail")
    }
}
