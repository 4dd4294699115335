//! ドメイン層
//!
//! 値オブジェクト・エンティティ・ワイヤ上の Envelope と、
//! ドメイン層が必要とする外部コラボレータのインターフェース
//! （`RoomStore` / `MessageBroker`）を定義します（依存性の逆転）。

pub mod broker;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod room;
pub mod store;

pub use broker::{BrokerError, MessageBroker, Subscription};
pub use connection::{
    ConnectionId, ConnectionIdFactory, ConnectionMeta, DisplayName, PusherChannel,
};
pub use envelope::{Envelope, OnlineUser, PresenceEvent};
pub use error::DomainError;
pub use room::{Room, RoomFlags, RoomId, RoomIdFactory};
pub use store::{RoomStore, StoreError};

#[cfg(test)]
pub use store::MockRoomStore;
