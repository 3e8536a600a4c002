//! UseCase: 参加者接続処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - ConnectParticipantUseCase::execute() メソッド
//! - ロビーモードのルーム自動作成、メンバー・接続の登録
//!
//! ### なぜこのテストが必要か
//! - 未知のルーム ID への接続は正当で、ルームを遅延作成する必要がある
//! - メンバー追加・接続登録の冪等性を保証
//! - ボット有効時にルームのエージェントが常駐することを確認
//!
//! ### どのような状況を想定しているか
//! - 正常系：未知ルームへの初回接続、既存ルームへの追加接続
//! - 冪等性：同じ参加者の再接続
//! - ボット無効時はエージェントを作成しない

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::domain::{
    AgentRegistry, ConnectionId, ConversationStore, MessagePusher, ParticipantId, PusherChannel,
    RoomId, RoomRegistry,
};
use crate::infrastructure::ConfigStore;

/// 参加者接続のユースケース
pub struct ConnectParticipantUseCase {
    /// ルームレジストリ（共有状態）
    registry: Arc<Mutex<RoomRegistry>>,
    /// エージェントレジストリ（共有状態）
    agents: Arc<Mutex<AgentRegistry>>,
    /// 管理者設定
    config: Arc<ConfigStore>,
    /// 永続ストア
    store: Arc<dyn ConversationStore>,
    /// MessagePusher（メッセージ通知の抽象化）
    pusher: Arc<dyn MessagePusher>,
}

impl ConnectParticipantUseCase {
    /// 新しい ConnectParticipantUseCase を作成
    pub fn new(
        registry: Arc<Mutex<RoomRegistry>>,
        agents: Arc<Mutex<AgentRegistry>>,
        config: Arc<ConfigStore>,
        store: Arc<dyn ConversationStore>,
        pusher: Arc<dyn MessagePusher>,
    ) -> Self {
        Self {
            registry,
            agents,
            config,
            store,
            pusher,
        }
    }

    /// 参加者接続を実行
    ///
    /// 未知のルーム ID はロビーとして正当に扱い、その場でルームを作成する。
    /// メンバー追加は冪等で、再接続してもメンバーシップは変わらない。
    ///
    /// # Arguments
    ///
    /// * `room_id` - 接続先のルーム ID
    /// * `participant` - 接続する参加者の ID
    /// * `sender` - この接続へメッセージを届けるチャンネル
    ///
    /// # Returns
    ///
    /// 採番された ConnectionId
    pub async fn execute(
        &self,
        room_id: &RoomId,
        participant: &ParticipantId,
        sender: PusherChannel,
    ) -> ConnectionId {
        use tsunagi_shared::time::get_unix_timestamp;

        let config = self.config.snapshot().await;
        let connection_id = ConnectionId::generate();

        // 1. ルームの遅延作成 + メンバー・接続の登録（1 クリティカルセクション）
        {
            let mut registry = self.registry.lock().await;
            registry.create_room(
                room_id.clone(),
                vec![],
                get_unix_timestamp(),
                config.bot_enabled,
            );
            registry.add_member(room_id, participant.clone());
            registry.add_connection(room_id, connection_id);
        }

        // 2. MessagePusher に接続を登録
        self.pusher.register_connection(connection_id, sender).await;

        // 3. 永続ストアへ upsert（失敗はログのみ）
        if let Err(e) = self.store.create_room(room_id).await {
            tracing::warn!("failed to persist room {}: {}", room_id, e);
        }

        // 4. ボット有効ならルーム常駐のエージェントを確保する
        if config.bot_enabled {
            let mut agents = self.agents.lock().await;
            agents.get_or_create(room_id, &config.bot_prompt);
            tracing::debug!("agent ready for room {}", room_id);
        }

        tracing::info!("participant '{}' connected to room {}", participant, room_id);
        connection_id
    }
}
