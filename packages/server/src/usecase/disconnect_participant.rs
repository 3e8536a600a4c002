//! UseCase: 参加者切断処理
//!
//! 切断では接続だけを取り除きます。メンバーシップは保持され、ルームも
//! 終了しません。ルームは明示的な終了・クリーンアップ操作だけが閉じます。
//! 切断はスケジュール済みの自動返信を取り消しません。

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::domain::{ConnectionId, MessagePusher, RoomId, RoomRegistry};

/// 参加者切断のユースケース
pub struct DisconnectParticipantUseCase {
    /// ルームレジストリ（共有状態）
    registry: Arc<Mutex<RoomRegistry>>,
    /// MessagePusher（メッセージ通知の抽象化）
    pusher: Arc<dyn MessagePusher>,
}

impl DisconnectParticipantUseCase {
    /// 新しい DisconnectParticipantUseCase を作成
    pub fn new(registry: Arc<Mutex<RoomRegistry>>, pusher: Arc<dyn MessagePusher>) -> Self {
        Self { registry, pusher }
    }

    /// 参加者切断を実行
    ///
    /// 接続をルームと MessagePusher の両方から取り除く。ルームや接続が
    /// 既に無い場合も no-op で完了する（切断経路は競合しうる）。
    pub async fn execute(&self, room_id: &RoomId, connection_id: &ConnectionId) {
        {
            let mut registry = self.registry.lock().await;
            registry.remove_connection(room_id, connection_id);
        }
        self.pusher.unregister_connection(connection_id).await;
        tracing::info!(
            "connection '{}' removed from room {}",
            connection_id,
            room_id
        );
    }
}
