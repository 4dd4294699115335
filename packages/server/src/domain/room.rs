//! Room エンティティと関連する値オブジェクト
//!
//! Room は時間制限つきのメッセージングスコープです。共有ストア上の
//! メタデータが唯一の真実で、各インスタンスは接続受付時と配信継続時に
//! 必ず有効期限を壁時計と照合します。期限切れのルームは配信せず削除します。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::connection::DisplayName;
use super::error::DomainError;

/// ルーム ID（不透明なトークン）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(value: String) -> Result<Self, DomainError> {
        if value.trim().is_empty() {
            return Err(DomainError::EmptyRoomId);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// ルーム ID のファクトリ
pub struct RoomIdFactory;

impl RoomIdFactory {
    pub fn generate() -> RoomId {
        RoomId(Uuid::new_v4().simple().to_string())
    }
}

/// ルームの設定フラグ
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomFlags {
    /// オーナーがオフラインになったらルームを削除する
    #[serde(default)]
    pub destroy_on_owner_offline: bool,
}

/// Room エンティティ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    /// 作成時刻（UTC ミリ秒）
    pub created_at: i64,
    /// 有効期限（UTC ミリ秒）
    pub expires_at: i64,
    /// 最大同時接続数
    pub max_users: usize,
    /// 入室パスワード（空なら誰でも入れる）
    pub password: Option<String>,
    /// オーナーの表示名
    pub owner_name: Option<String>,
    /// オーナーの接続元アドレス
    pub owner_addr: Option<String>,
    #[serde(default)]
    pub flags: RoomFlags,
}

impl Room {
    /// 有効期限が現在時刻より厳密に過去なら期限切れ
    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.expires_at < now_millis
    }

    pub fn has_password(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// パスワード検証。ルームにパスワードが無ければ常に成功する。
    pub fn verify_password(&self, supplied: Option<&str>) -> bool {
        match self.password.as_deref() {
            Some(expected) if !expected.is_empty() => supplied == Some(expected),
            _ => true,
        }
    }

    /// ルームの残り寿命（ミリ秒）。期限切れなら負になる。
    pub fn remaining_lifetime_millis(&self, now_millis: i64) -> i64 {
        self.expires_at - now_millis
    }

    /// 指定の表示名がオーナー名と一致するか（大文字小文字を区別しない）
    pub fn is_owner_name(&self, display_name: &DisplayName) -> bool {
        self.owner_name
            .as_deref()
            .is_some_and(|owner| owner.to_lowercase() == display_name.folded())
    }
}
