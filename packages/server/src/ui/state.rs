//! Server state shared across handlers.

use std::sync::Arc;

use crate::usecase::{
    AdminUseCase, ConnectParticipantUseCase, DisconnectParticipantUseCase, EndRoomUseCase,
    JoinQueueUseCase, LeaveQueueUseCase, RoomQueryUseCase, SendMessageUseCase,
};

/// Shared application state
pub struct AppState {
    /// JoinQueueUseCase（キュー参加のユースケース）
    pub join_queue_usecase: Arc<JoinQueueUseCase>,
    /// LeaveQueueUseCase（キュー離脱のユースケース）
    pub leave_queue_usecase: Arc<LeaveQueueUseCase>,
    /// ConnectParticipantUseCase（参加者接続のユースケース）
    pub connect_participant_usecase: Arc<ConnectParticipantUseCase>,
    /// DisconnectParticipantUseCase（参加者切断のユースケース）
    pub disconnect_participant_usecase: Arc<DisconnectParticipantUseCase>,
    /// SendMessageUseCase（メッセージ送信のユースケース）
    pub send_message_usecase: Arc<SendMessageUseCase>,
    /// EndRoomUseCase（ルーム終了のユースケース）
    pub end_room_usecase: Arc<EndRoomUseCase>,
    /// RoomQueryUseCase（ルーム問い合わせのユースケース）
    pub room_query_usecase: Arc<RoomQueryUseCase>,
    /// AdminUseCase（管理者操作のユースケース）
    pub admin_usecase: Arc<AdminUseCase>,
}
