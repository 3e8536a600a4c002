//! OpenAI Chat Completions を使った ReplyGenerator 実装
//!
//! ## 責務
//!
//! - エージェントが組み立てた会話ウィンドウを API リクエストへ変換
//! - 返信テキストの取り出し
//! - あらゆる失敗の固定フォールバック返信への縮退
//!
//! ## 設計ノート
//!
//! ReplyGenerator の契約上、この実装はエラーを返しません。リクエストの
//! 構築・送信・デコードのどこで失敗しても、固定のフォールバック返信の
//! いずれかを返します。フォールバックの選択は巡回カウンタで行い、
//! テストから再現可能にしています。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::domain::{AgentWindow, ReplyGenerator, TurnRole};

/// 生成に失敗したときに返す固定フォールバック返信
const FALLBACK_REPLIES: [&str; 4] = [
    "That sounds interesting! Could you tell me more?",
    "I see. Can you elaborate on that?",
    "That's a good point. What else would you like to discuss?",
    "Thanks for sharing! Do you have any other thoughts?",
];

/// OpenAI API の設定
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API キー
    api_key: String,
    /// 使用するモデル
    pub model: String,
    /// API のベース URL
    pub base_url: String,
    /// 返信の最大トークン数
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    /// リクエストのタイムアウト
    pub timeout: Duration,
}

impl OpenAiConfig {
    /// 新しい OpenAiConfig を作成
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "gpt-3.5-turbo".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            max_tokens: 150,
            temperature: 0.7,
            top_p: 0.9,
            timeout: Duration::from_secs(30),
        }
    }

    /// 環境変数 `OPENAI_API_KEY` から設定を作成
    pub fn from_env() -> Option<Self> {
        std::env::var("OPENAI_API_KEY").ok().map(Self::new)
    }

    /// ベース URL を差し替える（テスト用のモックサーバー向け）
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// モデルを差し替える
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// OpenAI Chat Completions を使った ReplyGenerator 実装
pub struct OpenAiReplyGenerator {
    config: OpenAiConfig,
    client: Client,
    /// フォールバック返信の巡回カウンタ
    fallback_cursor: AtomicUsize,
}

impl OpenAiReplyGenerator {
    /// 新しい OpenAiReplyGenerator を作成
    pub fn new(config: OpenAiConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            config,
            client,
            fallback_cursor: AtomicUsize::new(0),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    /// 次のフォールバック返信を取り出す
    fn fallback_reply(&self) -> String {
        let index = self.fallback_cursor.fetch_add(1, Ordering::Relaxed);
        FALLBACK_REPLIES[index % FALLBACK_REPLIES.len()].to_string()
    }

    fn to_request<'a>(&'a self, window: &'a AgentWindow) -> ChatCompletionRequest<'a> {
        let messages = window
            .turns
            .iter()
            .map(|turn| ApiMessage {
                role: match turn.role {
                    TurnRole::System => "system",
                    TurnRole::User => "user",
                    TurnRole::Assistant => "assistant",
                },
                content: &turn.content,
            })
            .collect();

        ChatCompletionRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
        }
    }

    async fn try_generate(&self, window: &AgentWindow) -> Result<String, reqwest::Error> {
        let request = self.to_request(window);
        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<ChatCompletionResponse>()
            .await?;

        let reply = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .unwrap_or_default()
            .trim()
            .to_string();

        Ok(reply)
    }
}

#[async_trait]
impl ReplyGenerator for OpenAiReplyGenerator {
    async fn generate(&self, window: &AgentWindow) -> String {
        match self.try_generate(window).await {
            Ok(reply) => {
                tracing::debug!("generated reply ({} chars)", reply.chars().count());
                reply
            }
            Err(e) => {
                tracing::warn!("reply generation failed, using fallback: {}", e);
                self.fallback_reply()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatTurn, ParticipantId, RoomId};

    fn test_window() -> AgentWindow {
        let mut agent = crate::domain::ChatAgent::new(RoomId::new("room_1"), "Be brief.");
        agent.build_window(&ParticipantId::new("alice"), "hello", "")
    }

    #[test]
    fn test_request_serialization_shape() {
        // テスト項目: ウィンドウが API リクエスト形式へ正しく変換される
        // given (前提条件):
        let generator = OpenAiReplyGenerator::new(OpenAiConfig::new("test-key"));
        let window = AgentWindow {
            turns: vec![
                ChatTurn::new(TurnRole::System, "Be brief."),
                ChatTurn::new(TurnRole::User, "alice: hello"),
                ChatTurn::new(TurnRole::Assistant, "hi"),
            ],
        };

        // when (操作):
        let request = generator.to_request(&window);
        let json = serde_json::to_value(&request).unwrap();

        // then (期待する結果):
        assert_eq!(json["model"], "gpt-3.5-turbo");
        assert_eq!(json["max_tokens"], 150);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "alice: hello");
        assert_eq!(json["messages"][2]["role"], "assistant");
    }

    #[test]
    fn test_fallback_replies_rotate() {
        // テスト項目: フォールバック返信が固定セットを巡回する
        // given (前提条件):
        let generator = OpenAiReplyGenerator::new(OpenAiConfig::new("test-key"));

        // when (操作):
        let replies: Vec<String> = (0..5).map(|_| generator.fallback_reply()).collect();

        // then (期待する結果): 4 種類を順番に使い、5 件目は先頭へ戻る
        assert_eq!(replies[0], FALLBACK_REPLIES[0]);
        assert_eq!(replies[1], FALLBACK_REPLIES[1]);
        assert_eq!(replies[2], FALLBACK_REPLIES[2]);
        assert_eq!(replies[3], FALLBACK_REPLIES[3]);
        assert_eq!(replies[4], FALLBACK_REPLIES[0]);
    }

    #[tokio::test]
    async fn test_generate_falls_back_on_unreachable_api() {
        // テスト項目: API へ到達できない場合でもフォールバック返信が返る
        // given (前提条件): 接続拒否されるローカルアドレスを指す
        let config = OpenAiConfig::new("test-key").with_base_url("http://127.0.0.1:9");
        let generator = OpenAiReplyGenerator::new(config);
        let window = test_window();

        // when (操作):
        let reply = generator.generate(&window).await;

        // then (期待する結果): エラーではなく固定フォールバックのいずれかが返る
        assert!(FALLBACK_REPLIES.contains(&reply.as_str()));
    }
}
