//! MatchQueue: 条件別 FIFO マッチングキュー
//!
//! ## 責務
//!
//! - 条件（condition）ごとの待機キューの管理
//! - 必要人数に達したバッチの FIFO 順での払い出し
//! - `user_to_queue` 逆引きインデックスの整合性維持
//!
//! ## 設計ノート
//!
//! 必要人数（group_size）はキュー自身が保持せず、呼び出しごとに引数で
//! 受け取ります。管理者が設定を変更した瞬間から次の enqueue / 再チェックに
//! 反映させるためです。サイズが縮小されてキューが新しいサイズを超過した
//! 場合、次の enqueue（または明示的な drain_ready）が満員バッチを全て
//! 即座に払い出します。
//!
//! 「既にルームを所有している参加者をキューに入れない」という制約は、
//! レジストリの逆引きを参照できるユースケース層が enqueue 前に検査します。

use std::collections::{HashMap, VecDeque};

use super::id::ParticipantId;

/// 既定のマッチング条件
pub const DEFAULT_CONDITION: &str = "default";

/// 条件別 FIFO マッチングキュー
#[derive(Debug, Default)]
pub struct MatchQueue {
    /// condition -> 待機中の参加者（FIFO）
    queues: HashMap<String, VecDeque<ParticipantId>>,
    /// 参加者 -> 待機中の condition の逆引きインデックス
    user_to_queue: HashMap<ParticipantId, String>,
}

impl MatchQueue {
    /// 新しい MatchQueue を作成
    pub fn new() -> Self {
        Self::default()
    }

    /// キューに参加し、満員になったバッチを払い出す
    ///
    /// # Arguments
    ///
    /// * `participant` - 参加者 ID
    /// * `condition` - マッチング条件
    /// * `required_size` - 現時点で必要なグループサイズ（設定から読み直した値）
    ///
    /// # Returns
    ///
    /// 成立したグループのリスト（FIFO 順）。通常は 0 個か 1 個だが、
    /// グループサイズの縮小直後は複数バッチが一度に成立することがある。
    /// 既にいずれかの条件で待機中の場合は何もせず空を返す（冪等）。
    pub fn enqueue(
        &mut self,
        participant: ParticipantId,
        condition: &str,
        required_size: usize,
    ) -> Vec<Vec<ParticipantId>> {
        if self.user_to_queue.contains_key(&participant) {
            tracing::warn!("'{}' is already in queue", participant);
            return Vec::new();
        }

        let queue = self.queues.entry(condition.to_string()).or_default();
        queue.push_back(participant.clone());
        self.user_to_queue
            .insert(participant, condition.to_string());

        tracing::debug!(
            "queue '{}' now holds {} participant(s) (required: {})",
            condition,
            self.queue_len(condition),
            required_size
        );

        self.drain_ready(condition, required_size)
    }

    /// 満員になったバッチを全て払い出す
    ///
    /// グループサイズ変更後の明示的な再チェックにも使う。
    /// `required_size` が 0 の場合は何も払い出さない。
    pub fn drain_ready(
        &mut self,
        condition: &str,
        required_size: usize,
    ) -> Vec<Vec<ParticipantId>> {
        if required_size == 0 {
            return Vec::new();
        }

        let mut groups = Vec::new();
        let Some(queue) = self.queues.get_mut(condition) else {
            return groups;
        };

        while queue.len() >= required_size {
            let group: Vec<ParticipantId> = queue.drain(..required_size).collect();
            for member in &group {
                self.user_to_queue.remove(member);
            }
            groups.push(group);
        }

        groups
    }

    /// キューから離脱する（冪等）
    ///
    /// 指定された条件のキューと逆引きインデックスから取り除く。
    /// 待機していなければ no-op。
    pub fn leave(&mut self, participant: &ParticipantId, condition: &str) {
        if let Some(queue) = self.queues.get_mut(condition) {
            let before = queue.len();
            queue.retain(|p| p != participant);
            if queue.len() < before {
                tracing::debug!("'{}' left queue '{}'", participant, condition);
            }
        }
        self.user_to_queue.remove(participant);
    }

    pub fn is_queued(&self, participant: &ParticipantId) -> bool {
        self.user_to_queue.contains_key(participant)
    }

    pub fn queue_len(&self, condition: &str) -> usize {
        self.queues.get(condition).map(|q| q.len()).unwrap_or(0)
    }

    /// 条件のキューで待機中の参加者一覧（FIFO 順）
    pub fn queued_participants(&self, condition: &str) -> Vec<ParticipantId> {
        self.queues
            .get(condition)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// 待機者が存在する条件の一覧
    pub fn conditions(&self) -> Vec<String> {
        let mut conditions: Vec<String> = self
            .queues
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(c, _)| c.clone())
            .collect();
        // Sort for consistent ordering
        conditions.sort();
        conditions
    }
}
