//! Server state shared across handlers.

use std::sync::Arc;

use crate::usecase::{
    CloseRoomUseCase, ConnectUseCase, CreateRoomUseCase, DisconnectUseCase, GetRoomDetailUseCase,
    PublishMessageUseCase,
};

/// Shared application state
pub struct AppState {
    /// ConnectUseCase（接続受付のユースケース）
    pub connect_usecase: Arc<ConnectUseCase>,
    /// DisconnectUseCase（切断処理のユースケース）
    pub disconnect_usecase: Arc<DisconnectUseCase>,
    /// PublishMessageUseCase（メッセージ発行のユースケース）
    pub publish_message_usecase: Arc<PublishMessageUseCase>,
    /// CreateRoomUseCase（ルーム作成のユースケース）
    pub create_room_usecase: Arc<CreateRoomUseCase>,
    /// GetRoomDetailUseCase（ルーム詳細照会のユースケース）
    pub get_room_detail_usecase: Arc<GetRoomDetailUseCase>,
    /// CloseRoomUseCase（ルームの明示クローズのユースケース）
    pub close_room_usecase: Arc<CloseRoomUseCase>,
}
