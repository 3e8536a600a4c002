//! Domain 層
//!
//! セッション調整のコアとなるエンティティ・値オブジェクト・インターフェースを定義します。
//! 外部コラボレータ（返信生成・永続ストア・メッセージ通知）へのインターフェースは
//! ドメイン層自身が定義し、具体的な実装は Infrastructure 層が提供します（依存性の逆転）。

pub mod agent;
pub mod config;
pub mod context;
pub mod generator;
pub mod id;
pub mod matching;
pub mod pusher;
pub mod registry;
pub mod room;
pub mod store;

pub use agent::{
    AgentRegistry, AgentWindow, ChatAgent, ChatTurn, DEFAULT_SYSTEM_PROMPT, MAX_HISTORY_TURNS,
    TurnRole,
};
pub use config::{AdminConfig, ConfigValidationError};
pub use context::{
    ACTIVE_WINDOW_SECONDS, ContextMessage, ContextRegistry, ContextSnapshot, ContextStatistics,
    ConversationContext, EXPORT_MESSAGE_LIMIT, GlobalStatistics, MAX_KEYWORDS_PER_USER,
    MAX_MESSAGES_PER_ROOM, UserProfile,
};
pub use generator::ReplyGenerator;
pub use id::{ConnectionId, ParticipantId, RoomId};
pub use matching::{DEFAULT_CONDITION, MatchQueue};
pub use pusher::{MessagePushError, MessagePusher, PusherChannel};
pub use registry::{RoomRegistry, RoomStatus};
pub use room::Room;
pub use store::{ConversationStore, StoreError, StoredMessage};
