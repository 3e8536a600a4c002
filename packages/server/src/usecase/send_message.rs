//! UseCase: メッセージ送信処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - SendMessageUseCase::execute() メソッド
//! - 永続化 → コンテキスト追記 → 全接続へのブロードキャスト → 返信トリガ
//!
//! ### なぜこのテストが必要か
//! - 受信フレームの処理順（永続化・追記・配送）が到着順を保つことの土台
//! - 空白フレームの無視、閉じた接続が混ざっていても配送が続くことを保証
//! - ボット有効時だけ遅延返信がスケジュールされることを確認
//!
//! ### どのような状況を想定しているか
//! - 正常系：複数接続への配送（送信者自身への echo を含む）
//! - エッジケース：空白のみのフレーム、接続のないルーム
//! - ボット無効時は返信タスクを起動しない

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::domain::{
    ContextRegistry, ConversationStore, MessagePusher, ParticipantId, RoomId, RoomRegistry,
};
use crate::infrastructure::ConfigStore;

use super::schedule_reply::ReplyScheduler;

/// メッセージ送信の結果
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// 配送した（reply_scheduled はボット返信タスクを起動したかどうか）
    Delivered { reply_scheduled: bool },
    /// 空白のみのフレームだったので無視した
    IgnoredBlank,
}

/// メッセージ送信のユースケース
pub struct SendMessageUseCase {
    /// ルームレジストリ（共有状態）
    registry: Arc<Mutex<RoomRegistry>>,
    /// 会話コンテキスト（共有状態）
    contexts: Arc<Mutex<ContextRegistry>>,
    /// 管理者設定
    config: Arc<ConfigStore>,
    /// 永続ストア
    store: Arc<dyn ConversationStore>,
    /// MessagePusher（メッセージ通知の抽象化）
    pusher: Arc<dyn MessagePusher>,
    /// 遅延返信のスケジューラ
    scheduler: Arc<ReplyScheduler>,
}

impl SendMessageUseCase {
    /// 新しい SendMessageUseCase を作成
    pub fn new(
        registry: Arc<Mutex<RoomRegistry>>,
        contexts: Arc<Mutex<ContextRegistry>>,
        config: Arc<ConfigStore>,
        store: Arc<dyn ConversationStore>,
        pusher: Arc<dyn MessagePusher>,
        scheduler: Arc<ReplyScheduler>,
    ) -> Self {
        Self {
            registry,
            contexts,
            config,
            store,
            pusher,
            scheduler,
        }
    }

    /// メッセージ送信を実行
    ///
    /// 空白のみのフレームは無視する。それ以外は永続化し、コンテキストへ
    /// 追記し、`"{participant}: {text}"` 形式でルームの全接続へ
    /// ブロードキャストする（送信者自身への echo を含む）。ボットが
    /// 有効なら遅延返信タスクを起動する。
    ///
    /// # Arguments
    ///
    /// * `room_id` - 送信先のルーム ID
    /// * `sender` - 送信者の参加者 ID
    /// * `text` - 受信したテキストフレーム
    pub async fn execute(
        &self,
        room_id: &RoomId,
        sender: &ParticipantId,
        text: &str,
    ) -> SendOutcome {
        use tsunagi_shared::time::get_unix_timestamp;

        if text.trim().is_empty() {
            return SendOutcome::IgnoredBlank;
        }

        let config = self.config.snapshot().await;
        let now = get_unix_timestamp();

        // 1. 永続化（fire-and-forget、失敗はログのみ）
        if let Err(e) = self
            .store
            .append_message(room_id, sender.as_str(), text, now)
            .await
        {
            tracing::warn!("failed to persist message for room {}: {}", room_id, e);
        }

        // 2. コンテキストへ追記（初回メッセージで遅延生成）
        {
            let mut contexts = self.contexts.lock().await;
            contexts
                .get_or_create(room_id, &config.bot_name, now)
                .add_message(sender.as_str(), text, now);
        }

        // 3. ルームの現在の全接続へブロードキャスト
        let formatted = format!("{}: {}", sender, text);
        let targets = {
            let registry = self.registry.lock().await;
            registry.connections(room_id)
        };
        if let Err(e) = self.pusher.broadcast(targets, &formatted).await {
            tracing::warn!("failed to broadcast message to room {}: {}", room_id, e);
        }

        // 4. ボット有効なら遅延返信をスケジュールする
        //    （ハンドルは手放す：接続のライフタイムとは独立に走る）
        let reply_scheduled = config.bot_enabled;
        if reply_scheduled {
            let _task =
                self.scheduler
                    .schedule(room_id.clone(), sender.clone(), text.to_string());
        }

        SendOutcome::Delivered { reply_scheduled }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AdminConfig, AgentRegistry, AgentWindow, ConnectionId, ReplyGenerator};
    use crate::infrastructure::{InMemoryConversationStore, WebSocketMessagePusher};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct SilentGenerator;

    #[async_trait]
    impl ReplyGenerator for SilentGenerator {
        async fn generate(&self, _window: &AgentWindow) -> String {
            String::new()
        }
    }

    struct Fixture {
        usecase: SendMessageUseCase,
        registry: Arc<Mutex<RoomRegistry>>,
        contexts: Arc<Mutex<ContextRegistry>>,
        store: Arc<InMemoryConversationStore>,
        pusher: Arc<WebSocketMessagePusher>,
    }

    fn create_fixture(config: AdminConfig) -> Fixture {
        let registry = Arc::new(Mutex::new(RoomRegistry::new()));
        let contexts = Arc::new(Mutex::new(ContextRegistry::new()));
        let agents = Arc::new(Mutex::new(AgentRegistry::new()));
        let config = Arc::new(ConfigStore::new(config));
        let store = Arc::new(InMemoryConversationStore::new());
        let pusher = Arc::new(WebSocketMessagePusher::new());

        let scheduler = Arc::new(ReplyScheduler::new(
            registry.clone(),
            contexts.clone(),
            agents,
            config.clone(),
            store.clone(),
            pusher.clone(),
            Arc::new(SilentGenerator),
        ));

        let usecase = SendMessageUseCase::new(
            registry.clone(),
            contexts.clone(),
            config,
            store.clone(),
            pusher.clone(),
            scheduler,
        );

        Fixture {
            usecase,
            registry,
            contexts,
            store,
            pusher,
        }
    }

    async fn add_connection(fixture: &Fixture, room_id: &RoomId) -> mpsc::UnboundedReceiver<String> {
        let conn = ConnectionId::generate();
        fixture.registry.lock().await.add_connection(room_id, conn);
        let (tx, rx) = mpsc::unbounded_channel();
        fixture.pusher.register_connection(conn, tx).await;
        rx
    }

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::new(s)
    }

    async fn create_room(fixture: &Fixture, room_id: &RoomId) {
        let mut registry = fixture.registry.lock().await;
        registry.create_room(room_id.clone(), vec![pid("alice")], 1_700_000_000_000, false);
    }

    #[tokio::test]
    async fn test_message_is_broadcast_to_all_connections() {
        // テスト項目: 送信者を含むルームの全接続へ配送される
        // given (前提条件):
        let fixture = create_fixture(AdminConfig {
            bot_enabled: false,
            ..AdminConfig::default()
        });
        let room_id = RoomId::new("room_1");
        create_room(&fixture, &room_id).await;
        let mut rx_alice = add_connection(&fixture, &room_id).await;
        let mut rx_bob = add_connection(&fixture, &room_id).await;

        // when (操作):
        let outcome = fixture.usecase.execute(&room_id, &pid("alice"), "hello").await;

        // then (期待する結果): 両方の接続へ "{participant}: {text}" 形式で届く
        assert_eq!(
            outcome,
            SendOutcome::Delivered {
                reply_scheduled: false
            }
        );
        assert_eq!(rx_alice.recv().await, Some("alice: hello".to_string()));
        assert_eq!(rx_bob.recv().await, Some("alice: hello".to_string()));
    }

    #[tokio::test]
    async fn test_blank_frame_is_ignored() {
        // テスト項目: 空白のみのフレームは何も起こさない
        // given (前提条件):
        let fixture = create_fixture(AdminConfig::default());
        let room_id = RoomId::new("room_1");
        create_room(&fixture, &room_id).await;
        let mut rx = add_connection(&fixture, &room_id).await;

        // when (操作):
        let outcome = fixture.usecase.execute(&room_id, &pid("alice"), "   ").await;

        // then (期待する結果): 配送も永続化もコンテキスト生成もされない
        assert_eq!(outcome, SendOutcome::IgnoredBlank);
        assert!(rx.try_recv().is_err());
        assert_eq!(fixture.store.message_count(&room_id).await, 0);
        assert!(fixture.contexts.lock().await.get(&room_id).is_none());
    }

    #[tokio::test]
    async fn test_message_is_persisted_and_added_to_context() {
        // テスト項目: メッセージが永続化されコンテキストへ追記される
        // given (前提条件):
        let fixture = create_fixture(AdminConfig {
            bot_enabled: false,
            ..AdminConfig::default()
        });
        let room_id = RoomId::new("room_1");
        create_room(&fixture, &room_id).await;

        // when (操作):
        fixture.usecase.execute(&room_id, &pid("alice"), "hello").await;
        fixture.usecase.execute(&room_id, &pid("alice"), "world").await;

        // then (期待する結果):
        assert_eq!(fixture.store.message_count(&room_id).await, 2);
        let contexts = fixture.contexts.lock().await;
        let ctx = contexts.get(&room_id).unwrap();
        assert_eq!(ctx.message_count(), 2);
        assert_eq!(ctx.user_profiles().get("alice").unwrap().message_count, 2);
    }

    #[tokio::test]
    async fn test_delivery_survives_stale_connection() {
        // テスト項目: 閉じた接続が残っていても生きている接続へ届く
        // given (前提条件):
        let fixture = create_fixture(AdminConfig {
            bot_enabled: false,
            ..AdminConfig::default()
        });
        let room_id = RoomId::new("room_1");
        create_room(&fixture, &room_id).await;
        let rx_stale = add_connection(&fixture, &room_id).await;
        drop(rx_stale); // 受信側を閉じて送信失敗を再現する
        let mut rx_live = add_connection(&fixture, &room_id).await;

        // when (操作):
        fixture.usecase.execute(&room_id, &pid("alice"), "still there?").await;

        // then (期待する結果): 生きている接続が受信する
        assert_eq!(rx_live.recv().await, Some("alice: still there?".to_string()));
    }

    #[tokio::test]
    async fn test_reply_scheduled_only_when_bot_enabled() {
        // テスト項目: ボット有効時だけ遅延返信がスケジュールされる
        // given (前提条件):
        let fixture_on = create_fixture(AdminConfig {
            bot_delay: 0,
            ..AdminConfig::default()
        });
        let fixture_off = create_fixture(AdminConfig {
            bot_enabled: false,
            ..AdminConfig::default()
        });
        let room_id = RoomId::new("room_1");
        create_room(&fixture_on, &room_id).await;
        create_room(&fixture_off, &room_id).await;

        // when (操作):
        let on = fixture_on.usecase.execute(&room_id, &pid("alice"), "hi").await;
        let off = fixture_off.usecase.execute(&room_id, &pid("alice"), "hi").await;

        // then (期待する結果):
        assert_eq!(
            on,
            SendOutcome::Delivered {
                reply_scheduled: true
            }
        );
        assert_eq!(
            off,
            SendOutcome::Delivered {
                reply_scheduled: false
            }
        );
    }

    #[tokio::test]
    async fn test_send_to_unknown_room_is_tolerated() {
        // テスト項目: 存在しないルームへの送信も no-op 的に完了する
        // given (前提条件):
        let fixture = create_fixture(AdminConfig {
            bot_enabled: false,
            ..AdminConfig::default()
        });
        let room_id = RoomId::new("ghost_room");

        // when (操作): ルーム未作成のまま送信する
        let outcome = fixture.usecase.execute(&room_id, &pid("alice"), "anyone?").await;

        // then (期待する結果): 配送先ゼロでも成功扱い（永続化と追記は行われる）
        assert_eq!(
            outcome,
            SendOutcome::Delivered {
                reply_scheduled: false
            }
        );
        assert_eq!(fixture.store.message_count(&room_id).await, 1);
    }
}
