//! MessagePusher trait 定義
//!
//! 接続済みトランスポートへのメッセージ送信を抽象化します。
//! 具体的な実装（WebSocket）は Infrastructure 層が提供します。

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use super::id::ConnectionId;

/// 接続ごとの送信チャンネル
pub type PusherChannel = mpsc::UnboundedSender<String>;

/// メッセージ送信のエラー
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MessagePushError {
    #[error("connection '{0}' not found")]
    ConnectionNotFound(String),
    #[error("failed to push message: {0}")]
    PushFailed(String),
}

/// MessagePusher trait
///
/// ブロードキャストはベストエフォート：一部の接続への送信失敗は
/// ログに残して読み飛ばし、他の接続への配送を妨げない。失敗した接続を
/// 勝手に登録解除してはならない（解除は明示的な切断経路だけが行う）。
#[async_trait]
pub trait MessagePusher: Send + Sync {
    /// 接続の送信チャンネルを登録する
    async fn register_connection(&self, connection_id: ConnectionId, sender: PusherChannel);

    /// 接続の送信チャンネルを登録解除する
    async fn unregister_connection(&self, connection_id: &ConnectionId);

    /// 特定の接続へメッセージを送る
    async fn push_to(
        &self,
        connection_id: &ConnectionId,
        content: &str,
    ) -> Result<(), MessagePushError>;

    /// 複数の接続へメッセージを送る（ベストエフォート）
    async fn broadcast(
        &self,
        targets: Vec<ConnectionId>,
        content: &str,
    ) -> Result<(), MessagePushError>;
}
