//! RoomStore の実装
//!
//! ## 実装
//!
//! - `memory`: プロセス内 HashMap + TTL による実装
//! - 将来的に: `redis` など

mod memory;

pub use memory::InMemoryRoomStore;
