//! MessageBroker の実装
//!
//! ## 実装
//!
//! - `memory`: tokio broadcast チャンネルによるプロセス内実装
//! - 将来的に: `redis` pub/sub など

mod memory;

pub use memory::InMemoryBroker;
