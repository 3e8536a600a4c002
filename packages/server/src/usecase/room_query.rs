//! UseCase: ルーム状態の問い合わせ
//!
//! ルームのスナップショット・ダッシュボード用の一覧・メッセージ履歴・
//! エクスポート用スナップショットを返す読み取り専用のユースケース。
//! 存在しないルームへの問い合わせはすべて None / 空結果に縮退します。

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::domain::{
    ContextMessage, ContextRegistry, ContextSnapshot, ConversationStore, ParticipantId, RoomId,
    RoomRegistry, RoomStatus, StoredMessage,
};

/// ダッシュボード用のルーム概況
#[derive(Debug, Clone, Serialize)]
pub struct RoomOverview {
    pub id: RoomId,
    pub participants: Vec<ParticipantId>,
    pub created_at: i64,
    pub connections: usize,
    pub bot_enabled: bool,
    pub message_count: usize,
    pub age_seconds: i64,
}

/// 全ルームの概況と合計値
#[derive(Debug, Clone, Serialize)]
pub struct RoomsOverview {
    pub rooms: Vec<RoomOverview>,
    pub total_rooms: usize,
    pub total_users: usize,
    pub total_messages: usize,
}

/// ルームのメッセージ履歴（コンテキスト由来）
#[derive(Debug, Clone, Serialize)]
pub struct RoomMessages {
    pub room_id: RoomId,
    pub messages: Vec<ContextMessage>,
    pub total: usize,
    pub participants: Vec<String>,
}

/// ルーム問い合わせのユースケース
pub struct RoomQueryUseCase {
    /// ルームレジストリ（共有状態）
    registry: Arc<Mutex<RoomRegistry>>,
    /// 会話コンテキスト（共有状態）
    contexts: Arc<Mutex<ContextRegistry>>,
    /// 永続ストア（履歴の読み出し）
    store: Arc<dyn ConversationStore>,
}

impl RoomQueryUseCase {
    /// 新しい RoomQueryUseCase を作成
    pub fn new(
        registry: Arc<Mutex<RoomRegistry>>,
        contexts: Arc<Mutex<ContextRegistry>>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            registry,
            contexts,
            store,
        }
    }

    /// ルーム状態のスナップショットを取得する
    pub async fn status(&self, room_id: &RoomId) -> Option<RoomStatus> {
        use tsunagi_shared::time::get_unix_timestamp;

        let registry = self.registry.lock().await;
        registry.status(room_id, get_unix_timestamp())
    }

    /// ダッシュボード用に全ルームの概況を取得する
    pub async fn overview(&self) -> RoomsOverview {
        use tsunagi_shared::time::get_unix_timestamp;

        let now = get_unix_timestamp();
        let statuses: Vec<RoomStatus> = {
            let registry = self.registry.lock().await;
            registry
                .room_ids()
                .iter()
                .filter_map(|id| registry.status(id, now))
                .collect()
        };

        let contexts = self.contexts.lock().await;
        let rooms: Vec<RoomOverview> = statuses
            .into_iter()
            .map(|status| {
                let message_count = contexts
                    .get(&status.room_id)
                    .map(|ctx| ctx.message_count())
                    .unwrap_or(0);
                RoomOverview {
                    id: status.room_id,
                    participants: status.members,
                    created_at: status.created_at,
                    connections: status.connection_count,
                    bot_enabled: status.bot_enabled,
                    message_count,
                    age_seconds: status.age_seconds,
                }
            })
            .collect();

        RoomsOverview {
            total_rooms: rooms.len(),
            total_users: rooms.iter().map(|r| r.participants.len()).sum(),
            total_messages: rooms.iter().map(|r| r.message_count).sum(),
            rooms,
        }
    }

    /// ルームの直近メッセージをコンテキストから取得する
    pub async fn messages(&self, room_id: &RoomId, limit: usize) -> RoomMessages {
        let contexts = self.contexts.lock().await;
        match contexts.get(room_id) {
            Some(ctx) => RoomMessages {
                room_id: room_id.clone(),
                messages: ctx.recent_messages(limit),
                total: ctx.message_count(),
                participants: ctx.user_profiles().keys().cloned().collect(),
            },
            None => RoomMessages {
                room_id: room_id.clone(),
                messages: Vec::new(),
                total: 0,
                participants: Vec::new(),
            },
        }
    }

    /// 永続ストアからルームの履歴を読み出す（古い順）
    pub async fn history(&self, room_id: &RoomId, limit: usize) -> Vec<StoredMessage> {
        match self.store.get_history(room_id, limit).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!("failed to read history for room {}: {}", room_id, e);
                Vec::new()
            }
        }
    }

    /// エクスポート用のスナップショットとメンバー一覧を取得する
    ///
    /// コンテキストが存在しないルームは None（エクスポート対象なし）。
    pub async fn export_snapshot(
        &self,
        room_id: &RoomId,
    ) -> Option<(ContextSnapshot, Vec<ParticipantId>)> {
        use tsunagi_shared::time::get_unix_timestamp;

        let snapshot = {
            let contexts = self.contexts.lock().await;
            contexts
                .get(room_id)
                .map(|ctx| ctx.snapshot(get_unix_timestamp()))
        }?;
        let members = {
            let registry = self.registry.lock().await;
            registry.members(room_id)
        };
        Some((snapshot, members))
    }
}
