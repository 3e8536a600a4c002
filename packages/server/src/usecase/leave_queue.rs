//! UseCase: マッチングキューからの離脱

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::domain::{MatchQueue, ParticipantId};

/// キュー離脱のユースケース
pub struct LeaveQueueUseCase {
    /// マッチングキュー（共有状態）
    queue: Arc<Mutex<MatchQueue>>,
}

impl LeaveQueueUseCase {
    /// 新しい LeaveQueueUseCase を作成
    pub fn new(queue: Arc<Mutex<MatchQueue>>) -> Self {
        Self { queue }
    }

    /// キュー離脱を実行（冪等、待機していなければ no-op）
    pub async fn execute(&self, participant: &ParticipantId, condition: &str) {
        let mut queue = self.queue.lock().await;
        queue.leave(participant, condition);
    }
}
