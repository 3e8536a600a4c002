//! UseCase: マッチングキューへの参加
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - JoinQueueUseCase::execute() メソッド
//! - キュー参加とグループ成立、ルーム作成、逆引きインデックスの更新
//!
//! ### なぜこのテストが必要か
//! - ビジネスロジックの検証：到着順のグループ成立とルーム作成
//! - 既にルームを持つ参加者がキューへ入らないことを保証
//! - グループサイズ縮小後の即時バッチ払い出しを保証
//!
//! ### どのような状況を想定しているか
//! - 正常系：2 人目の到着でマッチ成立
//! - 冪等性：待機中の再参加、マッチ済み参加者の再参加
//! - エッジケース：グループサイズ縮小による複数バッチの一括成立

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::domain::{
    ConversationStore, MatchQueue, ParticipantId, RoomId, RoomRegistry,
};
use crate::infrastructure::ConfigStore;

/// キュー参加の結果
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// マッチ成立（既にルームを持っていた場合もこちら）
    Matched {
        room_id: RoomId,
        partners: Vec<ParticipantId>,
    },
    /// まだ待機中
    Waiting,
}

/// キュー参加のユースケース
pub struct JoinQueueUseCase {
    /// ルームレジストリ（共有状態）
    registry: Arc<Mutex<RoomRegistry>>,
    /// マッチングキュー（共有状態）
    queue: Arc<Mutex<MatchQueue>>,
    /// 管理者設定（グループサイズは呼び出しごとに読み直す）
    config: Arc<ConfigStore>,
    /// 永続ストア（ルーム作成の upsert）
    store: Arc<dyn ConversationStore>,
}

impl JoinQueueUseCase {
    /// 新しい JoinQueueUseCase を作成
    pub fn new(
        registry: Arc<Mutex<RoomRegistry>>,
        queue: Arc<Mutex<MatchQueue>>,
        config: Arc<ConfigStore>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            registry,
            queue,
            config,
            store,
        }
    }

    /// キュー参加を実行
    ///
    /// # Arguments
    ///
    /// * `participant` - 参加者 ID
    /// * `condition` - マッチング条件
    ///
    /// # Returns
    ///
    /// * `MatchOutcome::Matched` - マッチ成立（自分のルームとパートナー一覧）
    /// * `MatchOutcome::Waiting` - まだ待機中
    pub async fn execute(&self, participant: ParticipantId, condition: &str) -> MatchOutcome {
        // 1. 既にルームを持っている参加者はキューに入れず、そのルームを返す
        {
            let registry = self.registry.lock().await;
            if let Some(room_id) = registry.room_of(&participant) {
                let partners = registry
                    .members(room_id)
                    .into_iter()
                    .filter(|m| m != &participant)
                    .collect();
                return MatchOutcome::Matched {
                    room_id: room_id.clone(),
                    partners,
                };
            }
        }

        // 2. グループサイズは呼び出し時点の設定を読み直す（キャッシュしない）
        let config = self.config.snapshot().await;

        // 3. キューへ追加し、満員になったバッチを払い出す
        let groups = {
            let mut queue = self.queue.lock().await;
            queue.enqueue(participant.clone(), condition, config.group_size)
        };

        // 4. 成立したグループごとにルームを作成する
        let rooms = self.create_rooms(groups, config.bot_enabled).await;

        rooms
            .into_iter()
            .find(|(_, group)| group.contains(&participant))
            .map(|(room_id, group)| MatchOutcome::Matched {
                room_id,
                partners: group.into_iter().filter(|m| m != &participant).collect(),
            })
            .unwrap_or(MatchOutcome::Waiting)
    }

    /// 待機中の全条件を現在のグループサイズで再チェックする
    ///
    /// 管理者がグループサイズを縮小した直後に呼ばれ、既に満員になっている
    /// バッチを新着を待たずに払い出す。成立したルーム数を返す。
    pub async fn recheck(&self) -> usize {
        let config = self.config.snapshot().await;

        let groups = {
            let mut queue = self.queue.lock().await;
            let mut all_groups = Vec::new();
            for condition in queue.conditions() {
                all_groups.extend(queue.drain_ready(&condition, config.group_size));
            }
            all_groups
        };

        self.create_rooms(groups, config.bot_enabled).await.len()
    }

    /// 成立したグループごとにルームを作成し、永続ストアへ upsert する
    async fn create_rooms(
        &self,
        groups: Vec<Vec<ParticipantId>>,
        bot_enabled: bool,
    ) -> Vec<(RoomId, Vec<ParticipantId>)> {
        use tsunagi_shared::time::get_unix_timestamp;

        let mut rooms = Vec::with_capacity(groups.len());
        for group in groups {
            let room_id = RoomId::generate();
            {
                let mut registry = self.registry.lock().await;
                registry.create_room(room_id.clone(), group.clone(), get_unix_timestamp(), bot_enabled);
            }

            if let Err(e) = self.store.create_room(&room_id).await {
                tracing::warn!("failed to persist room {}: {}", room_id, e);
            }

            tracing::info!(
                "match successful: room {} created with users: {}",
                room_id,
                group
                    .iter()
                    .map(|p| p.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            rooms.push((room_id, group));
        }
        rooms
    }
}
