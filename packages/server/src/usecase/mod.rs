//! UseCase 層
//!
//! ビジネスロジックの置き場所です。ドメイン層の trait
//! （`RoomStore` / `MessageBroker`）と Infrastructure 層のプロセス内状態
//! （`ConnectionRegistry`）を組み合わせ、接続受付・メッセージ発行・
//! 切断処理・Relay Task 管理・ルーム管理を実装します。

pub mod connect;
pub mod disconnect;
pub mod error;
pub mod publish_message;
pub mod relay;
pub mod rooms;

pub use connect::{AdmittedConnection, ConnectParams, ConnectUseCase};
pub use disconnect::DisconnectUseCase;
pub use error::{
    AdmissionError, CloseRoomError, CreateRoomError, GetRoomDetailError, PublishError,
};
pub use publish_message::PublishMessageUseCase;
pub use relay::RoomRelay;
pub use rooms::{
    CloseRoomUseCase, CreateRoomInput, CreateRoomUseCase, GetRoomDetailUseCase, RoomDetail,
};
