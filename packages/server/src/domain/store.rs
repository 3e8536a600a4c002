//! ConversationStore trait 定義
//!
//! ドメイン層が必要とする永続ストアへのインターフェースを定義します。
//! 具体的な実装は Infrastructure 層が提供します（依存性の逆転）。
//!
//! コアから見た書き込みは fire-and-forget（失敗はログに残すだけ）で、
//! 履歴の読み出しだけが呼び出し元をブロックします。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::id::RoomId;

/// 永続化されたメッセージ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub room_id: RoomId,
    pub sender: String,
    pub text: String,
    /// Unix ミリ秒
    pub timestamp: i64,
}

/// 永続ストアのエラー
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// ConversationStore trait
///
/// メッセージとルームの永続化ストアへのインターフェース。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// ルームを作成（冪等 upsert：既に存在すれば何もしない）
    async fn create_room(&self, room_id: &RoomId) -> Result<(), StoreError>;

    /// メッセージを追記する
    async fn append_message(
        &self,
        room_id: &RoomId,
        sender: &str,
        text: &str,
        timestamp: i64,
    ) -> Result<(), StoreError>;

    /// ルームの履歴を古い順で取得する（最大 `limit` 件）
    async fn get_history(
        &self,
        room_id: &RoomId,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StoreError>;

    /// 既知のルーム ID 一覧を取得する
    async fn list_rooms(&self) -> Result<Vec<RoomId>, StoreError>;
}
