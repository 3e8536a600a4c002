//! UseCase: 遅延自動返信のスケジューリング
//!
//! ## 責務
//!
//! 受信メッセージ 1 件につき独立した遅延タスクを 1 つ起動し、
//! チェックポイントを進めながら自動返信を生成・配送します。
//!
//! ```text
//! Scheduled -(遅延経過)-> Generating -> Broadcasting -> Done
//!      \________________ いずれの時点でも Aborted ________________/
//! ```
//!
//! ## 設計ノート
//!
//! 遅延の間に管理者がボットを無効化したりルームが閉じられたりするため、
//! 各チェックポイントでは必ず設定とレジストリを読み直します。スケジュール
//! 時点の `bot_enabled` / `bot_name` / `bot_delay` をローカルに抱えて
//! はいけません。同じルームの複数メッセージに対するタスクは互いに
//! キューイングせず並行に進みます。切断はタスクを取り消しません。
//! 自己中断はチェックポイントの再検証だけで起こります。
//!
//! 遅延経過後の本体は `run_after_delay` として公開してあり、テストは
//! 実際に眠らずに各チェックポイントを決定的に通過できます。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::domain::{
    AgentRegistry, ContextRegistry, ConversationStore, MessagePusher, ParticipantId,
    ReplyGenerator, RoomId, RoomRegistry,
};
use crate::infrastructure::ConfigStore;

/// 遅延返信タスクの結果
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyOutcome {
    /// 返信を配送・永続化した
    Delivered { reply: String },
    /// 遅延中にボットが無効化された
    AbortedBotDisabled,
    /// 対象のルームが存在しなくなった
    AbortedRoomClosed,
    /// 生成結果が空だった
    AbortedEmptyReply,
}

/// スケジュール済みの返信タスクのハンドル
///
/// ドロップしてもタスクは走り続ける（接続のライフタイムと
/// 返信タスクは独立）。明示的に中止したい場合だけ `abort` を呼ぶ。
#[derive(Debug)]
pub struct ScheduledReply {
    handle: JoinHandle<ReplyOutcome>,
}

impl ScheduledReply {
    /// タスクを明示的に中止する
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// タスクの完了を待って結果を取り出す（テスト用）
    ///
    /// 中止済み・パニックの場合は None。
    pub async fn outcome(self) -> Option<ReplyOutcome> {
        self.handle.await.ok()
    }
}

/// 遅延自動返信のスケジューラ
pub struct ReplyScheduler {
    /// ルームレジストリ（共有状態）
    registry: Arc<Mutex<RoomRegistry>>,
    /// 会話コンテキスト（共有状態）
    contexts: Arc<Mutex<ContextRegistry>>,
    /// エージェントレジストリ（共有状態）
    agents: Arc<Mutex<AgentRegistry>>,
    /// 管理者設定（チェックポイントごとに読み直す）
    config: Arc<ConfigStore>,
    /// 永続ストア
    store: Arc<dyn ConversationStore>,
    /// MessagePusher（メッセージ通知の抽象化）
    pusher: Arc<dyn MessagePusher>,
    /// 返信生成器（外部コラボレータ）
    generator: Arc<dyn ReplyGenerator>,
}

impl ReplyScheduler {
    /// 新しい ReplyScheduler を作成
    pub fn new(
        registry: Arc<Mutex<RoomRegistry>>,
        contexts: Arc<Mutex<ContextRegistry>>,
        agents: Arc<Mutex<AgentRegistry>>,
        config: Arc<ConfigStore>,
        store: Arc<dyn ConversationStore>,
        pusher: Arc<dyn MessagePusher>,
        generator: Arc<dyn ReplyGenerator>,
    ) -> Self {
        Self {
            registry,
            contexts,
            agents,
            config,
            store,
            pusher,
            generator,
        }
    }

    /// 受信メッセージに対する遅延返信タスクを起動する
    ///
    /// 遅延は起動時点の設定値で待ち始めるが、経過後のチェックポイントが
    /// 改めて最新の設定・レジストリ状態を検証する。
    pub fn schedule(
        self: &Arc<Self>,
        room_id: RoomId,
        user_id: ParticipantId,
        user_message: String,
    ) -> ScheduledReply {
        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            // 1. 遅延を待つ（値は待ち始める時点で読み直す）
            let delay = scheduler.config.snapshot().await.bot_delay;
            tokio::time::sleep(Duration::from_secs(delay)).await;

            scheduler
                .run_after_delay(&room_id, &user_id, &user_message)
                .await
        });

        ScheduledReply { handle }
    }

    /// 遅延経過後のチェックポイント本体
    ///
    /// テストから直接呼べるように分離してある。
    pub async fn run_after_delay(
        &self,
        room_id: &RoomId,
        user_id: &ParticipantId,
        user_message: &str,
    ) -> ReplyOutcome {
        use tsunagi_shared::time::get_unix_timestamp;

        // 2. 再検証: 設定とレジストリを読み直す
        let config = self.config.snapshot().await;
        if !config.bot_enabled {
            tracing::debug!("reply task aborted: bot disabled for room {}", room_id);
            return ReplyOutcome::AbortedBotDisabled;
        }
        if !self.registry.lock().await.contains(room_id) {
            tracing::debug!("reply task aborted: room {} no longer exists", room_id);
            return ReplyOutcome::AbortedRoomClosed;
        }

        // 3. 会話サマリを土台にしたウィンドウで返信を生成する
        //    （生成器は失敗時もフォールバック返信を返す契約）
        let grounding = {
            let mut contexts = self.contexts.lock().await;
            contexts
                .get_or_create(room_id, &config.bot_name, get_unix_timestamp())
                .get_context_summary(10)
        };
        let window = {
            let mut agents = self.agents.lock().await;
            agents
                .get_or_create(room_id, &config.bot_prompt)
                .build_window(user_id, user_message, &grounding)
        };
        let reply = self.generator.generate(&window).await;

        // 4. 空の返信は配送も永続化もしない
        if reply.trim().is_empty() {
            tracing::debug!("reply task aborted: empty reply for room {}", room_id);
            return ReplyOutcome::AbortedEmptyReply;
        }
        {
            let mut agents = self.agents.lock().await;
            if let Some(agent) = agents.get_mut(room_id) {
                agent.record_reply(&reply);
            }
        }

        // 5. 配送・永続化（bot_name は読み直す。ルームが生成中に閉じられて
        //    いればここでも中断する）
        let bot_name = self.config.snapshot().await.bot_name;
        let targets = {
            let registry = self.registry.lock().await;
            if !registry.contains(room_id) {
                tracing::debug!("reply task aborted: room {} closed during generation", room_id);
                return ReplyOutcome::AbortedRoomClosed;
            }
            registry.connections(room_id)
        };

        let formatted = format!("{}: {}", bot_name, reply);
        if let Err(e) = self.pusher.broadcast(targets, &formatted).await {
            tracing::warn!("failed to broadcast reply to room {}: {}", room_id, e);
        }

        let now = get_unix_timestamp();
        if let Err(e) = self
            .store
            .append_message(room_id, &bot_name, &reply, now)
            .await
        {
            tracing::warn!("failed to persist reply for room {}: {}", room_id, e);
        }
        {
            let mut contexts = self.contexts.lock().await;
            contexts
                .get_or_create(room_id, &bot_name, now)
                .add_message(&bot_name, &reply, now);
        }

        tracing::info!("automated reply delivered to room {}", room_id);
        ReplyOutcome::Delivered { reply }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AdminConfig, AgentWindow, ConnectionId};
    use crate::infrastructure::{InMemoryConversationStore, WebSocketMessagePusher};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - チェックポイントごとの中断条件（ボット無効・ルーム消滅・空返信）
    // - 成功経路での配送・永続化・コンテキスト追記
    // - schedule() で起動したタスクの完了
    //
    // 【なぜこのテストが必要か】
    // - 遅延ウィンドウ中の設定変更・ルーム終了は運用上の定常イベントで、
    //   そのたびに返信が漏れたり二重配送されたりしてはならない
    // - run_after_delay を直接呼ぶことで、眠らずに決定的に検証できる
    // ========================================

    // Stub ReplyGenerator for testing
    struct StubGenerator {
        reply: String,
    }

    #[async_trait]
    impl ReplyGenerator for StubGenerator {
        async fn generate(&self, _window: &AgentWindow) -> String {
            self.reply.clone()
        }
    }

    struct Fixture {
        scheduler: Arc<ReplyScheduler>,
        registry: Arc<Mutex<RoomRegistry>>,
        contexts: Arc<Mutex<ContextRegistry>>,
        config: Arc<ConfigStore>,
        store: Arc<InMemoryConversationStore>,
        pusher: Arc<WebSocketMessagePusher>,
    }

    fn create_fixture(config: AdminConfig, reply: &str) -> Fixture {
        let registry = Arc::new(Mutex::new(RoomRegistry::new()));
        let contexts = Arc::new(Mutex::new(ContextRegistry::new()));
        let agents = Arc::new(Mutex::new(AgentRegistry::new()));
        let config = Arc::new(ConfigStore::new(config));
        let store = Arc::new(InMemoryConversationStore::new());
        let pusher = Arc::new(WebSocketMessagePusher::new());
        let generator = Arc::new(StubGenerator {
            reply: reply.to_string(),
        });

        let scheduler = Arc::new(ReplyScheduler::new(
            registry.clone(),
            contexts.clone(),
            agents,
            config.clone(),
            store.clone(),
            pusher.clone(),
            generator,
        ));

        Fixture {
            scheduler,
            registry,
            contexts,
            config,
            store,
            pusher,
        }
    }

    async fn setup_room(fixture: &Fixture, room_id: &RoomId) -> mpsc::UnboundedReceiver<String> {
        let conn = ConnectionId::generate();
        {
            let mut registry = fixture.registry.lock().await;
            registry.create_room(
                room_id.clone(),
                vec![ParticipantId::new("alice")],
                1_700_000_000_000,
                true,
            );
            registry.add_connection(room_id, conn);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        fixture.pusher.register_connection(conn, tx).await;
        rx
    }

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::new(s)
    }

    #[tokio::test]
    async fn test_reply_is_delivered_and_persisted() {
        // テスト項目: 成功経路で返信が配送・永続化・コンテキスト追記される
        // given (前提条件):
        let fixture = create_fixture(AdminConfig::default(), "nice to meet you");
        let room_id = RoomId::new("room_1");
        let mut rx = setup_room(&fixture, &room_id).await;

        // when (操作):
        let outcome = fixture
            .scheduler
            .run_after_delay(&room_id, &pid("alice"), "hello")
            .await;

        // then (期待する結果):
        assert_eq!(
            outcome,
            ReplyOutcome::Delivered {
                reply: "nice to meet you".to_string()
            }
        );
        // 接続へ "{bot_name}: {reply}" 形式で届く
        assert_eq!(rx.recv().await, Some("Bot: nice to meet you".to_string()));
        // 永続ストアへ追記されている
        assert_eq!(fixture.store.message_count(&room_id).await, 1);
        // コンテキストにボットのメッセージが追記され、プロファイルは増えない
        let contexts = fixture.contexts.lock().await;
        let ctx = contexts.get(&room_id).unwrap();
        assert_eq!(ctx.message_count(), 1);
        assert!(ctx.user_profiles().is_empty());
    }

    #[tokio::test]
    async fn test_aborts_when_bot_disabled_mid_delay() {
        // テスト項目: 遅延中にボットが無効化されたら配送も永続化もされない
        // given (前提条件): スケジュール時点では有効だった
        let fixture = create_fixture(AdminConfig::default(), "should not appear");
        let room_id = RoomId::new("room_1");
        let mut rx = setup_room(&fixture, &room_id).await;

        // when (操作): 遅延の間に管理者がボットを無効化する
        fixture
            .config
            .update(AdminConfig {
                bot_enabled: false,
                ..AdminConfig::default()
            })
            .await
            .unwrap();
        let outcome = fixture
            .scheduler
            .run_after_delay(&room_id, &pid("alice"), "hello")
            .await;

        // then (期待する結果): 中断され、何も配送・永続化されない
        assert_eq!(outcome, ReplyOutcome::AbortedBotDisabled);
        assert!(rx.try_recv().is_err());
        assert_eq!(fixture.store.message_count(&room_id).await, 0);
        assert!(fixture.contexts.lock().await.get(&room_id).is_none());
    }

    #[tokio::test]
    async fn test_aborts_when_room_closed_mid_delay() {
        // テスト項目: 遅延中にルームが終了していたら中断する
        // given (前提条件):
        let fixture = create_fixture(AdminConfig::default(), "should not appear");
        let room_id = RoomId::new("room_1");
        setup_room(&fixture, &room_id).await;

        // when (操作): 遅延の間にルームが終了する
        fixture.registry.lock().await.end_room(&room_id);
        let outcome = fixture
            .scheduler
            .run_after_delay(&room_id, &pid("alice"), "hello")
            .await;

        // then (期待する結果):
        assert_eq!(outcome, ReplyOutcome::AbortedRoomClosed);
        assert_eq!(fixture.store.message_count(&room_id).await, 0);
    }

    #[tokio::test]
    async fn test_aborts_on_empty_reply() {
        // テスト項目: 空の生成結果は配送も永続化もされない
        // given (前提条件):
        let fixture = create_fixture(AdminConfig::default(), "   ");
        let room_id = RoomId::new("room_1");
        let mut rx = setup_room(&fixture, &room_id).await;

        // when (操作):
        let outcome = fixture
            .scheduler
            .run_after_delay(&room_id, &pid("alice"), "hello")
            .await;

        // then (期待する結果):
        assert_eq!(outcome, ReplyOutcome::AbortedEmptyReply);
        assert!(rx.try_recv().is_err());
        assert_eq!(fixture.store.message_count(&room_id).await, 0);
    }

    #[tokio::test]
    async fn test_bot_name_is_read_fresh_at_broadcast() {
        // テスト項目: 配送時の表示名は遅延後に読み直した最新の bot_name になる
        // given (前提条件):
        let fixture = create_fixture(AdminConfig::default(), "hello there");
        let room_id = RoomId::new("room_1");
        let mut rx = setup_room(&fixture, &room_id).await;

        // when (操作): 遅延の間に bot_name が変わる
        fixture
            .config
            .update(AdminConfig {
                bot_name: "Kaiwa".to_string(),
                ..AdminConfig::default()
            })
            .await
            .unwrap();
        fixture
            .scheduler
            .run_after_delay(&room_id, &pid("alice"), "hello")
            .await;

        // then (期待する結果): 新しい名前で配送される
        assert_eq!(rx.recv().await, Some("Kaiwa: hello there".to_string()));
    }

    #[tokio::test]
    async fn test_schedule_spawns_independent_task() {
        // テスト項目: schedule() が独立タスクとして完走する
        // given (前提条件): 遅延 0 秒の設定
        let config = AdminConfig {
            bot_delay: 0,
            ..AdminConfig::default()
        };
        let fixture = create_fixture(config, "from the task");
        let room_id = RoomId::new("room_1");
        let mut rx = setup_room(&fixture, &room_id).await;

        // when (操作):
        let scheduled =
            fixture
                .scheduler
                .schedule(room_id.clone(), pid("alice"), "hello".to_string());
        let outcome = scheduled.outcome().await;

        // then (期待する結果):
        assert_eq!(
            outcome,
            Some(ReplyOutcome::Delivered {
                reply: "from the task".to_string()
            })
        );
        assert_eq!(rx.recv().await, Some("Bot: from the task".to_string()));
    }

    #[tokio::test]
    async fn test_scheduled_reply_can_be_aborted() {
        // テスト項目: 明示的な abort でタスクが結果なしに終わる
        // given (前提条件): 長い遅延が設定されている
        let config = AdminConfig {
            bot_delay: 60,
            ..AdminConfig::default()
        };
        let fixture = create_fixture(config, "never delivered");
        let room_id = RoomId::new("room_1");
        let mut rx = setup_room(&fixture, &room_id).await;

        // when (操作): スケジュール直後に中止する
        let scheduled =
            fixture
                .scheduler
                .schedule(room_id.clone(), pid("alice"), "hello".to_string());
        scheduled.abort();

        // then (期待する結果): 結果は得られず、何も配送されない
        // （切断では abort しない。これは管理用の明示的な中止経路）
        assert_eq!(scheduled.outcome().await, None);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_multiple_replies_can_be_in_flight() {
        // テスト項目: 同じルームの複数メッセージ分のタスクが並行して完走する
        // given (前提条件):
        let config = AdminConfig {
            bot_delay: 0,
            ..AdminConfig::default()
        };
        let fixture = create_fixture(config, "echo");
        let room_id = RoomId::new("room_1");
        let mut rx = setup_room(&fixture, &room_id).await;

        // when (操作): 3 件のメッセージ分をスケジュールする
        let tasks: Vec<ScheduledReply> = (0..3)
            .map(|i| {
                fixture
                    .scheduler
                    .schedule(room_id.clone(), pid("alice"), format!("msg {}", i))
            })
            .collect();
        for task in tasks {
            assert!(task.outcome().await.is_some());
        }

        // then (期待する結果): 3 件の返信が届いている
        for _ in 0..3 {
            assert_eq!(rx.recv().await, Some("Bot: echo".to_string()));
        }
    }
}
