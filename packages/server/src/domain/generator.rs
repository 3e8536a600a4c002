//! ReplyGenerator trait 定義
//!
//! 自動応答の本文を生成する外部コラボレータへのインターフェース。
//! 具体的な実装は Infrastructure 層が提供します（依存性の逆転）。

use async_trait::async_trait;

use super::agent::AgentWindow;

/// ReplyGenerator trait
///
/// 契約: 呼び出し元へエラーを伝播してはならない。内部で失敗した場合は
/// 少数の固定フォールバック返信のいずれかを返すこと。空文字列を返した
/// 場合、呼び出し側のスケジューラはその返信を破棄する。
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// 会話ウィンドウから返信を生成する
    async fn generate(&self, window: &AgentWindow) -> String;
}
