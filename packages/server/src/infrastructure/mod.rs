//! インフラストラクチャ層
//!
//! ドメイン層が定義する trait（`RoomStore` / `MessageBroker`）の具体的な
//! 実装と、このインスタンスに固有のプロセス内状態（Connection Registry）、
//! および境界の DTO を提供します。

pub mod broker;
pub mod dto;
pub mod registry;
pub mod store;

pub use broker::InMemoryBroker;
pub use registry::ConnectionRegistry;
pub use store::InMemoryRoomStore;
