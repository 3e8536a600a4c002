//! InMemory ConversationStore 実装
//!
//! ドメイン層が定義する ConversationStore trait の具体的な実装。
//! HashMap をインメモリ DB として使用します。レジストリと同様に
//! 単一プロセスのメモリが正であるという前提に立っており、外部 DBMS を
//! 導入する場合はこの trait の別実装として追加します。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{ConversationStore, RoomId, StoreError, StoredMessage};

#[derive(Debug, Default)]
struct StoreInner {
    /// 既知のルーム ID（作成順）
    rooms: Vec<RoomId>,
    /// room_id -> 追記順のメッセージ
    messages: HashMap<RoomId, Vec<StoredMessage>>,
}

/// インメモリ ConversationStore 実装
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryConversationStore {
    /// 新しい InMemoryConversationStore を作成
    pub fn new() -> Self {
        Self::default()
    }

    /// 保存済みメッセージ数を取得（テスト・診断用）
    pub async fn message_count(&self, room_id: &RoomId) -> usize {
        let inner = self.inner.lock().await;
        inner.messages.get(room_id).map(|m| m.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create_room(&self, room_id: &RoomId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.rooms.contains(room_id) {
            inner.rooms.push(room_id.clone());
            tracing::debug!("room '{}' created in store", room_id);
        }
        Ok(())
    }

    async fn append_message(
        &self,
        room_id: &RoomId,
        sender: &str,
        text: &str,
        timestamp: i64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.rooms.contains(room_id) {
            inner.rooms.push(room_id.clone());
        }
        inner
            .messages
            .entry(room_id.clone())
            .or_default()
            .push(StoredMessage {
                room_id: room_id.clone(),
                sender: sender.to_string(),
                text: text.to_string(),
                timestamp,
            });
        Ok(())
    }

    async fn get_history(
        &self,
        room_id: &RoomId,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let inner = self.inner.lock().await;
        let Some(messages) = inner.messages.get(room_id) else {
            return Ok(Vec::new());
        };
        // 直近 limit 件を古い順で返す
        let skip = messages.len().saturating_sub(limit);
        Ok(messages[skip..].to_vec())
    }

    async fn list_rooms(&self) -> Result<Vec<RoomId>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.rooms.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_room_is_idempotent() {
        // テスト項目: 同じルームを二度作成しても 1 件のまま
        // given (前提条件):
        let store = InMemoryConversationStore::new();
        let room_id = RoomId::new("room_1");

        // when (操作):
        store.create_room(&room_id).await.unwrap();
        store.create_room(&room_id).await.unwrap();

        // then (期待する結果):
        let rooms = store.list_rooms().await.unwrap();
        assert_eq!(rooms, vec![room_id]);
    }

    #[tokio::test]
    async fn test_append_and_get_history_in_order() {
        // テスト項目: 追記したメッセージが古い順で取得できる
        // given (前提条件):
        let store = InMemoryConversationStore::new();
        let room_id = RoomId::new("room_1");

        // when (操作):
        store
            .append_message(&room_id, "alice", "first", 1000)
            .await
            .unwrap();
        store
            .append_message(&room_id, "bob", "second", 2000)
            .await
            .unwrap();
        let history = store.get_history(&room_id, 10).await.unwrap();

        // then (期待する結果):
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text, "first");
        assert_eq!(history[1].text, "second");
    }

    #[tokio::test]
    async fn test_get_history_returns_most_recent_limit() {
        // テスト項目: limit 超過時は直近 limit 件が古い順で返る
        // given (前提条件):
        let store = InMemoryConversationStore::new();
        let room_id = RoomId::new("room_1");
        for i in 0..10 {
            store
                .append_message(&room_id, "alice", &format!("msg {}", i), i)
                .await
                .unwrap();
        }

        // when (操作):
        let history = store.get_history(&room_id, 3).await.unwrap();

        // then (期待する結果):
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].text, "msg 7");
        assert_eq!(history[2].text, "msg 9");
    }

    #[tokio::test]
    async fn test_get_history_of_unknown_room_is_empty() {
        // テスト項目: 存在しないルームの履歴は空になる
        // given (前提条件):
        let store = InMemoryConversationStore::new();

        // when (操作):
        let history = store.get_history(&RoomId::new("nope"), 10).await.unwrap();

        // then (期待する結果):
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_append_registers_room_implicitly() {
        // テスト項目: create_room 前の追記でもルームが既知になる
        // given (前提条件):
        let store = InMemoryConversationStore::new();
        let room_id = RoomId::new("room_lazy");

        // when (操作):
        store
            .append_message(&room_id, "alice", "hello", 1000)
            .await
            .unwrap();

        // then (期待する結果):
        let rooms = store.list_rooms().await.unwrap();
        assert_eq!(rooms, vec![room_id]);
    }
}
