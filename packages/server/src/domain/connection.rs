//! 接続（Connection）に関する値オブジェクトとエンティティ
//!
//! Connection はクライアント1つのルームへのライブな接続です。ID は
//! フリート全体で一意に生成され、表示名はルーム内で（大文字小文字を
//! 区別せず）一意でなければなりません。

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::error::DomainError;

/// クライアントへの送信チャンネル
pub type PusherChannel = mpsc::UnboundedSender<String>;

/// 表示名の最大文字数
const MAX_DISPLAY_NAME_CHARS: usize = 64;

/// 接続 ID（フリート全体で一意）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(value: String) -> Result<Self, DomainError> {
        if value.trim().is_empty() {
            return Err(DomainError::EmptyConnectionId);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 接続 ID のファクトリ
pub struct ConnectionIdFactory;

impl ConnectionIdFactory {
    /// フリート全体で一意な接続 ID を生成する
    pub fn generate() -> ConnectionId {
        ConnectionId(Uuid::new_v4().simple().to_string())
    }
}

/// 表示名（ルーム内で一意、大文字小文字を区別しない）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayName(String);

impl DisplayName {
    pub fn new(value: String) -> Result<Self, DomainError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DomainError::EmptyDisplayName);
        }
        let chars = trimmed.chars().count();
        if chars > MAX_DISPLAY_NAME_CHARS {
            return Err(DomainError::DisplayNameTooLong(chars));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// 表示名が指定されなかった接続のための代替名
    pub fn fallback(connection_id: &ConnectionId) -> Self {
        let tail: String = connection_id.as_str().chars().take(8).collect();
        Self(format!("guest-{tail}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 大文字小文字を区別しない比較のための正規化形
    pub fn folded(&self) -> String {
        self.0.to_lowercase()
    }
}

/// 接続のメタデータ（共有ストアにミラーされる）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionMeta {
    pub id: ConnectionId,
    pub display_name: DisplayName,
    /// 接続時刻（UTC ミリ秒）
    pub connected_at: i64,
}

impl ConnectionMeta {
    pub fn new(id: ConnectionId, display_name: DisplayName, connected_at: i64) -> Self {
        Self {
            id,
            display_name,
            connected_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_factory_generates_unique_ids() {
        // テスト項目: 生成される接続 ID が一意である
        // given (前提条件):

        // when (操作):
        let id1 = ConnectionIdFactory::generate();
        let id2 = ConnectionIdFactory::generate();

        // then (期待する結果):
        assert_ne!(id1, id2);
        assert!(!id1.as_str().is_empty());
    }

    #[test]
    fn test_connection_id_rejects_empty_value() {
        // テスト項目: 空の接続 ID が拒否される
        // given (前提条件):
        let value = "   ".to_string();

        // when (操作):
        let result = ConnectionId::new(value);

        // then (期待する結果):
        assert_eq!(result, Err(DomainError::EmptyConnectionId));
    }

    #[test]
    fn test_display_name_trims_whitespace() {
        // テスト項目: 表示名の前後の空白が除去される
        // given (前提条件):
        let value = "  alice  ".to_string();

        // when (操作):
        let name = DisplayName::new(value).unwrap();

        // then (期待する結果):
        assert_eq!(name.as_str(), "alice");
    }

    #[test]
    fn test_display_name_rejects_empty_value() {
        // テスト項目: 空の表示名が拒否される
        // given (前提条件):
        let value = "".to_string();

        // when (操作):
        let result = DisplayName::new(value);

        // then (期待する結果):
        assert_eq!(result, Err(DomainError::EmptyDisplayName));
    }

    #[test]
    fn test_display_name_rejects_too_long_value() {
        // テスト項目: 長すぎる表示名が拒否される
        // given (前提条件):
        let value = "x".repeat(65);

        // when (操作):
        let result = DisplayName::new(value);

        // then (期待する結果):
        assert_eq!(result, Err(DomainError::DisplayNameTooLong(65)));
    }

    #[test]
    fn test_display_name_folded_is_case_insensitive() {
        // テスト項目: folded() が大文字小文字を区別しない正規化形を返す
        // given (前提条件):
        let upper = DisplayName::new("Alice".to_string()).unwrap();
        let lower = DisplayName::new("alice".to_string()).unwrap();

        // when (操作):

        // then (期待する結果):
        assert_eq!(upper.folded(), lower.folded());
        assert_ne!(upper.as_str(), lower.as_str());
    }

    #[test]
    fn test_display_name_fallback_derives_from_connection_id() {
        // テスト項目: 代替の表示名が接続 ID の先頭から生成される
        // given (前提条件):
        let connection_id = ConnectionId::new("0123456789abcdef".to_string()).unwrap();

        // when (操作):
        let name = DisplayName::fallback(&connection_id);

        // then (期待する結果):
        assert_eq!(name.as_str(), "guest-01234567");
    }
}
