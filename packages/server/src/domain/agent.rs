//! ルームごとの自動応答エージェント
//!
//! システムプロンプトと直近の会話履歴を保持し、返信生成器へ渡す
//! ウィンドウ（システム指示 + 直近 10 ターン + 会話サマリによる
//! グラウンディング + 最新のユーザー発話）を組み立てます。
//! エージェント自体は生成 API を呼びません。呼び出しは Infrastructure 層の
//! ReplyGenerator 実装が担います。

use std::collections::HashMap;

use serde::Serialize;

use super::id::{ParticipantId, RoomId};

/// プロンプト未設定時に使う既定のシステム指示
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful, neutral conversational partner. \
     Use clear and respectful language, ask clarifying questions when needed, \
     and keep the conversation natural and balanced.";

/// ウィンドウに含める直近ターン数
pub const MAX_HISTORY_TURNS: usize = 10;

/// 会話ターンの役割
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    System,
    User,
    Assistant,
}

/// 会話の 1 ターン
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// 返信生成器へ渡す会話ウィンドウ
///
/// 先頭は必ずシステム指示で、続いて直近の履歴が古い順に並ぶ。
#[derive(Debug, Clone, PartialEq)]
pub struct AgentWindow {
    pub turns: Vec<ChatTurn>,
}

/// ルームに常駐する会話エージェント
#[derive(Debug, Clone)]
pub struct ChatAgent {
    room_id: RoomId,
    system_prompt: String,
    /// 直近の user / assistant ターン（上限あり）
    history: Vec<ChatTurn>,
}

impl ChatAgent {
    /// 新しい ChatAgent を作成
    ///
    /// プロンプトが空か空白のみの場合は既定のシステム指示に差し替える。
    pub fn new(room_id: RoomId, system_prompt: &str) -> Self {
        let prompt = Self::normalize_prompt(system_prompt);
        if prompt == DEFAULT_SYSTEM_PROMPT {
            tracing::debug!("agent for room {} uses the default system prompt", room_id);
        }
        Self {
            room_id,
            system_prompt: prompt,
            history: Vec::new(),
        }
    }

    fn normalize_prompt(prompt: &str) -> String {
        if prompt.trim().is_empty() {
            DEFAULT_SYSTEM_PROMPT.to_string()
        } else {
            prompt.to_string()
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// システムプロンプトを更新する（空なら既定値へ戻す）
    pub fn update_system_prompt(&mut self, new_prompt: &str) {
        self.system_prompt = Self::normalize_prompt(new_prompt);
    }

    /// ユーザー発話を履歴へ積み、生成用ウィンドウを組み立てる
    ///
    /// # Arguments
    ///
    /// * `user_id` - 発話した参加者の ID
    /// * `message` - 発話本文
    /// * `grounding` - 会話サマリ（ConversationContext::get_context_summary の出力）
    pub fn build_window(
        &mut self,
        user_id: &ParticipantId,
        message: &str,
        grounding: &str,
    ) -> AgentWindow {
        self.push_turn(ChatTurn::new(
            TurnRole::User,
            format!("{}: {}", user_id, message),
        ));

        let system_content = if grounding.is_empty() {
            self.system_prompt.clone()
        } else {
            format!("{}\n\n{}", self.system_prompt, grounding)
        };

        let mut turns = Vec::with_capacity(self.history.len() + 1);
        turns.push(ChatTurn::new(TurnRole::System, system_content));
        turns.extend(self.history.iter().cloned());

        AgentWindow { turns }
    }

    /// 生成された返信を履歴へ積む
    pub fn record_reply(&mut self, reply: &str) {
        self.push_turn(ChatTurn::new(TurnRole::Assistant, reply));
    }

    fn push_turn(&mut self, turn: ChatTurn) {
        self.history.push(turn);
        if self.history.len() > MAX_HISTORY_TURNS {
            let excess = self.history.len() - MAX_HISTORY_TURNS;
            self.history.drain(..excess);
        }
    }
}

/// 全ルームのエージェントを管理するレジストリ
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: HashMap<RoomId, ChatAgent>,
}

impl AgentRegistry {
    /// 新しい AgentRegistry を作成
    pub fn new() -> Self {
        Self::default()
    }

    /// エージェントを取得（無ければ作成）
    ///
    /// 既存エージェントのプロンプトが最新の設定と異なる場合は更新する。
    /// 管理者がプロンプトを変更したとき、稼働中のエージェントにも
    /// 反映させるため。
    pub fn get_or_create(&mut self, room_id: &RoomId, system_prompt: &str) -> &mut ChatAgent {
        let normalized = if system_prompt.trim().is_empty() {
            DEFAULT_SYSTEM_PROMPT
        } else {
            system_prompt
        };

        let agent = self
            .agents
            .entry(room_id.clone())
            .or_insert_with(|| ChatAgent::new(room_id.clone(), normalized));
        if agent.system_prompt() != normalized {
            agent.update_system_prompt(normalized);
            tracing::debug!("agent prompt refreshed for room {}", room_id);
        }
        agent
    }

    pub fn get_mut(&mut self, room_id: &RoomId) -> Option<&mut ChatAgent> {
        self.agents.get_mut(room_id)
    }

    /// ルームのエージェントを取り除く
    pub fn remove(&mut self, room_id: &RoomId) -> Option<ChatAgent> {
        self.agents.remove(room_id)
    }

    /// 全エージェントを破棄し、破棄した数を返す
    pub fn clear(&mut self) -> usize {
        let count = self.agents.len();
        self.agents.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
