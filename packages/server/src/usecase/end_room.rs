//! UseCase: ルーム終了処理
//!
//! ルーム終了はレジストリからの削除、全接続の解放、会話コンテキストの
//! アーカイブと破棄、常駐エージェントの破棄をまとめて行います。
//! 存在しないルームに対しては no-op（二重終了は定常の競合）。

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::domain::{AgentRegistry, ContextRegistry, MessagePusher, RoomId, RoomRegistry};
use crate::infrastructure::ContextArchive;

/// ルーム終了のユースケース
pub struct EndRoomUseCase {
    /// ルームレジストリ（共有状態）
    registry: Arc<Mutex<RoomRegistry>>,
    /// 会話コンテキスト（共有状態）
    contexts: Arc<Mutex<ContextRegistry>>,
    /// エージェントレジストリ（共有状態）
    agents: Arc<Mutex<AgentRegistry>>,
    /// MessagePusher（接続の解放に使う）
    pusher: Arc<dyn MessagePusher>,
    /// 会話スナップショットのアーカイバ
    archive: Arc<ContextArchive>,
}

impl EndRoomUseCase {
    /// 新しい EndRoomUseCase を作成
    pub fn new(
        registry: Arc<Mutex<RoomRegistry>>,
        contexts: Arc<Mutex<ContextRegistry>>,
        agents: Arc<Mutex<AgentRegistry>>,
        pusher: Arc<dyn MessagePusher>,
        archive: Arc<ContextArchive>,
    ) -> Self {
        Self {
            registry,
            contexts,
            agents,
            pusher,
            archive,
        }
    }

    /// ルーム終了を実行
    ///
    /// # Returns
    ///
    /// ルームが実際に存在して終了された場合は true。存在しなければ
    /// false（no-op）。
    pub async fn execute(&self, room_id: &RoomId) -> bool {
        use tsunagi_shared::time::get_unix_timestamp;

        // 1. レジストリから削除（メンバーの逆引きも解放される）
        let ended = {
            let mut registry = self.registry.lock().await;
            registry.end_room(room_id)
        };

        // 2. ルームが持っていた接続を解放する
        if let Some(room) = &ended {
            for connection in &room.connections {
                self.pusher.unregister_connection(connection).await;
            }
        }

        // 3. 会話コンテキストをアーカイブして破棄する
        let removed_context = {
            let mut contexts = self.contexts.lock().await;
            contexts.remove(room_id)
        };
        if let Some(context) = removed_context {
            let now = get_unix_timestamp();
            self.archive.archive(&context.snapshot(now), now).await;
        }

        // 4. 常駐エージェントを破棄する
        {
            let mut agents = self.agents.lock().await;
            agents.remove(room_id);
        }

        match &ended {
            Some(room) => {
                tracing::info!(
                    "room {} ended (users: {})",
                    room_id,
                    room.members
                        .iter()
                        .map(|m| m.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                true
            }
            None => false,
        }
    }
}
