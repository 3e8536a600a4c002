//! UseCase 層
//!
//! 1 操作 1 ユースケースで、共有状態（レジストリ・キュー・コンテキスト）と
//! 外部コラボレータ（ストア・生成器・プッシャー）を束ねます。共有状態の
//! 変更は必ずロックを保持した非中断のクリティカルセクションで行い、
//! await を跨いでロックを保持しません。

pub mod admin;
pub mod connect_participant;
pub mod disconnect_participant;
pub mod end_room;
pub mod join_queue;
pub mod leave_queue;
pub mod room_query;
pub mod schedule_reply;
pub mod send_message;

pub use admin::{AdminStats, AdminUseCase, CleanupReport};
pub use connect_participant::ConnectParticipantUseCase;
pub use disconnect_participant::DisconnectParticipantUseCase;
pub use end_room::EndRoomUseCase;
pub use join_queue::{JoinQueueUseCase, MatchOutcome};
pub use leave_queue::LeaveQueueUseCase;
pub use room_query::{RoomMessages, RoomOverview, RoomQueryUseCase, RoomsOverview};
pub use schedule_reply::{ReplyOutcome, ReplyScheduler, ScheduledReply};
pub use send_message::{SendMessageUseCase, SendOutcome};
