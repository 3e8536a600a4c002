//! UseCase: 管理者操作
//!
//! 設定の取得・更新、運用統計、エージェントのリセット、非活動ルームの
//! クリーンアップをまとめた管理者向けのユースケース。設定更新は検証
//! エラーだけを呼び出し元へ返します（設定・入力エラーは表面化してよい
//! 唯一の区分）。

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::domain::{
    ACTIVE_WINDOW_SECONDS, AdminConfig, AgentRegistry, ConfigValidationError, ContextRegistry,
    RoomId, RoomRegistry,
};
use crate::infrastructure::{ConfigStore, ContextArchive};

use super::end_room::EndRoomUseCase;
use super::join_queue::JoinQueueUseCase;

/// 運用統計
#[derive(Debug, Clone, Serialize)]
pub struct AdminStats {
    /// 直近 5 分間に活動した参加者数
    pub active_now: usize,
    /// 設定されたセッション時間（分）
    pub avg_session: u64,
    /// 最も発言の多い参加者
    pub top_user: String,
    pub top_user_messages: usize,
    /// 参加者ごとの発言数
    pub distribution: BTreeMap<String, usize>,
    pub total_messages: usize,
    pub total_users: usize,
    pub active_rooms: usize,
}

/// クリーンアップの結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupReport {
    pub cleaned_rooms: usize,
    pub cleaned_contexts: usize,
}

/// 管理者操作のユースケース
pub struct AdminUseCase {
    /// 管理者設定
    config: Arc<ConfigStore>,
    /// ルームレジストリ（共有状態）
    registry: Arc<Mutex<RoomRegistry>>,
    /// 会話コンテキスト（共有状態）
    contexts: Arc<Mutex<ContextRegistry>>,
    /// エージェントレジストリ（共有状態）
    agents: Arc<Mutex<AgentRegistry>>,
    /// キュー参加ユースケース（設定変更後の再チェックに使う）
    join_queue: Arc<JoinQueueUseCase>,
    /// ルーム終了ユースケース（クリーンアップに使う）
    end_room: Arc<EndRoomUseCase>,
    /// 会話スナップショットのアーカイバ
    archive: Arc<ContextArchive>,
}

impl AdminUseCase {
    /// 新しい AdminUseCase を作成
    pub fn new(
        config: Arc<ConfigStore>,
        registry: Arc<Mutex<RoomRegistry>>,
        contexts: Arc<Mutex<ContextRegistry>>,
        agents: Arc<Mutex<AgentRegistry>>,
        join_queue: Arc<JoinQueueUseCase>,
        end_room: Arc<EndRoomUseCase>,
        archive: Arc<ContextArchive>,
    ) -> Self {
        Self {
            config,
            registry,
            contexts,
            agents,
            join_queue,
            end_room,
            archive,
        }
    }

    /// 現在の設定を取得する
    pub async fn get_config(&self) -> AdminConfig {
        self.config.snapshot().await
    }

    /// 設定を更新する
    ///
    /// 検証 → 反映・保存 → 待機キューの再チェック。グループサイズが
    /// 縮小されてキューが既に満員になっている場合、新着を待たずに
    /// ルームが成立する。
    pub async fn update_config(
        &self,
        new_config: AdminConfig,
    ) -> Result<AdminConfig, ConfigValidationError> {
        self.config.update(new_config).await?;

        let applied = self.config.snapshot().await;
        tracing::info!(
            "admin configuration updated: group_size={}, duration={}m, bot_enabled={}, bot_delay={}s, bot_name='{}'",
            applied.group_size,
            applied.duration,
            applied.bot_enabled,
            applied.bot_delay,
            applied.bot_name
        );

        let matched_rooms = self.join_queue.recheck().await;
        if matched_rooms > 0 {
            tracing::info!(
                "{} room(s) matched immediately after config change",
                matched_rooms
            );
        }

        Ok(applied)
    }

    /// 運用統計を取得する
    pub async fn stats(&self) -> AdminStats {
        use tsunagi_shared::time::get_unix_timestamp;

        let now = get_unix_timestamp();
        let config = self.config.snapshot().await;
        let active_rooms = {
            let registry = self.registry.lock().await;
            registry.room_count()
        };

        let contexts = self.contexts.lock().await;
        let mut distribution: BTreeMap<String, usize> = BTreeMap::new();
        let mut active_now = 0;
        for room_id in contexts.global_statistics(now).room_ids {
            let Some(ctx) = contexts.get(&room_id) else {
                continue;
            };
            if (now - ctx.last_activity()) / 1000 < ACTIVE_WINDOW_SECONDS {
                active_now += ctx.user_profiles().len();
            }
            for (user, profile) in ctx.user_profiles() {
                *distribution.entry(user.clone()).or_insert(0) += profile.message_count;
            }
        }

        let (top_user, top_user_messages) = distribution
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(user, count)| (user.clone(), *count))
            .unwrap_or_else(|| ("None".to_string(), 0));

        AdminStats {
            active_now,
            avg_session: config.duration,
            top_user,
            top_user_messages,
            total_messages: distribution.values().sum(),
            total_users: distribution.len(),
            distribution,
            active_rooms,
        }
    }

    /// 全エージェントを破棄する
    pub async fn reset_agents(&self) -> usize {
        let mut agents = self.agents.lock().await;
        let count = agents.clear();
        tracing::info!("all {} agent instance(s) reset by admin", count);
        count
    }

    /// 非活動のルームとコンテキストを掃除する
    ///
    /// 作成から `max_room_age_hours` を超えたルームを終了し、
    /// `max_inactive_minutes` を超えて活動のないコンテキストを
    /// アーカイブして破棄する。外部（管理者操作や cron）から起動される
    /// 掃除であり、ルーム自身はタイマーを持たない。
    pub async fn cleanup(
        &self,
        max_room_age_hours: i64,
        max_inactive_minutes: i64,
    ) -> CleanupReport {
        use tsunagi_shared::time::get_unix_timestamp;

        let now = get_unix_timestamp();

        // 1. 古いルームを特定して終了する
        let stale_rooms: Vec<RoomId> = {
            let registry = self.registry.lock().await;
            registry
                .room_ids()
                .into_iter()
                .filter(|id| {
                    registry
                        .status(id, now)
                        .map(|s| s.age_seconds > max_room_age_hours * 3600)
                        .unwrap_or(false)
                })
                .collect()
        };
        let mut cleaned_rooms = 0;
        for room_id in stale_rooms {
            if self.end_room.execute(&room_id).await {
                cleaned_rooms += 1;
            }
        }

        // 2. 非活動のコンテキストをアーカイブして破棄する
        let removed = {
            let mut contexts = self.contexts.lock().await;
            contexts.remove_inactive(max_inactive_minutes, now)
        };
        let cleaned_contexts = removed.len();
        for context in removed {
            self.archive.archive(&context.snapshot(now), now).await;
        }

        if cleaned_rooms > 0 || cleaned_contexts > 0 {
            tracing::info!(
                "cleanup completed: {} room(s), {} context(s)",
                cleaned_rooms,
                cleaned_contexts
            );
        }

        CleanupReport {
            cleaned_rooms,
            cleaned_contexts,
        }
    }
}
