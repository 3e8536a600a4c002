//! ConversationContext: ルームごとの会話コンテキスト
//!
//! ## 責務
//!
//! - 上限付きメッセージログの管理（上限超過時は最古を退避し turn を振り直す）
//! - 参加者プロファイル（メッセージ数・キーワード・平均文字数）の集計
//! - 返信生成器に渡す会話サマリの組み立て
//! - 統計値とエクスポート用スナップショットの生成
//!
//! ## 設計ノート
//!
//! 自動応答の送信者はプロファイル集計から除外しますが、メッセージログには
//! 必ず残します。除外判定は呼び出し元が設定する表示名プレフィックスで行います。
//! サマリは外部の返信生成器へそのまま渡されるペイロードなので、構成と
//! 切り詰めルールは見た目の問題ではなく機能的な契約です。

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::LazyLock;

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use tsunagi_shared::time::timestamp_to_rfc3339;

use super::id::RoomId;

/// 1 ルームあたりのメッセージ保持上限
pub const MAX_MESSAGES_PER_ROOM: usize = 1000;

/// 1 参加者あたりのキーワード保持上限
pub const MAX_KEYWORDS_PER_USER: usize = 50;

/// エクスポート時に保持する直近メッセージ数
pub const EXPORT_MESSAGE_LIMIT: usize = 100;

/// 「アクティブ」とみなす最終活動からの秒数
pub const ACTIVE_WINDOW_SECONDS: i64 = 300;

/// キーワード抽出で除外するストップワード
static STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
        "is", "am", "are", "was", "were", "be", "been", "being", "have", "has", "had", "do",
        "does", "did", "will", "would", "shall", "should", "may", "might", "must", "can", "could",
        "i", "you", "he", "she", "it", "we", "they", "me", "him", "her", "us", "them", "my",
        "your", "his", "its", "our", "their", "mine", "yours", "hers", "ours", "theirs", "this",
        "that", "these", "those", "here", "there", "what", "which", "who", "whom", "whose",
        "when", "where", "why", "how",
    ])
});

/// 会話ログの 1 エントリ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub sender: String,
    pub text: String,
    /// Unix ミリ秒
    pub timestamp: i64,
    /// 1 始まりの密な連番
    pub turn: usize,
}

/// 参加者プロファイル
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub message_count: usize,
    pub first_message_at: i64,
    pub last_message_at: i64,
    /// 直近のキーワード（上限超過時は最古を退避）
    pub keywords: Vec<String>,
    pub total_chars: usize,
    pub avg_message_length: f64,
}

impl UserProfile {
    fn new(timestamp: i64) -> Self {
        Self {
            message_count: 0,
            first_message_at: timestamp,
            last_message_at: timestamp,
            keywords: Vec::new(),
            total_chars: 0,
            avg_message_length: 0.0,
        }
    }
}

/// 会話統計
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextStatistics {
    pub room_id: RoomId,
    pub total_messages: usize,
    pub total_participants: usize,
    pub total_characters: usize,
    pub average_message_length: f64,
    pub participant_messages: BTreeMap<String, usize>,
    pub duration: String,
    pub created_at: String,
    pub last_activity: String,
    pub is_active: bool,
}

/// エクスポート用スナップショット
///
/// メッセージは直近 `EXPORT_MESSAGE_LIMIT` 件に切り詰めますが、
/// `summary` の統計は切り詰め前の全ログから計算します。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub room_id: RoomId,
    pub created_at: String,
    pub last_activity: String,
    pub messages: Vec<ContextMessage>,
    pub user_profiles: BTreeMap<String, UserProfile>,
    pub total_turns: usize,
    pub active_participants: usize,
    pub summary: ContextStatistics,
}

/// ルームごとの会話コンテキスト
#[derive(Debug, Clone)]
pub struct ConversationContext {
    room_id: RoomId,
    messages: VecDeque<ContextMessage>,
    user_profiles: BTreeMap<String, UserProfile>,
    /// 自動応答の送信者を見分ける表示名プレフィックス
    agent_prefix: String,
    created_at: i64,
    last_activity: i64,
}

impl ConversationContext {
    /// 新しい ConversationContext を作成
    pub fn new(room_id: RoomId, created_at: i64) -> Self {
        tracing::debug!("conversation context created for room {}", room_id);
        Self {
            room_id,
            messages: VecDeque::new(),
            user_profiles: BTreeMap::new(),
            agent_prefix: "Bot".to_string(),
            created_at,
            last_activity: created_at,
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn last_activity(&self) -> i64 {
        self.last_activity
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn messages(&self) -> impl Iterator<Item = &ContextMessage> {
        self.messages.iter()
    }

    /// 直近 n 件のメッセージ
    pub fn recent_messages(&self, n: usize) -> Vec<ContextMessage> {
        let skip = self.messages.len().saturating_sub(n);
        self.messages.iter().skip(skip).cloned().collect()
    }

    pub fn user_profiles(&self) -> &BTreeMap<String, UserProfile> {
        &self.user_profiles
    }

    /// 自動応答の表示名プレフィックスを設定（空文字は無視）
    pub fn set_agent_prefix(&mut self, prefix: &str) {
        if !prefix.trim().is_empty() {
            self.agent_prefix = prefix.to_string();
        }
    }

    /// 最終活動時刻だけを更新する
    pub fn touch(&mut self, now_millis: i64) {
        self.last_activity = now_millis;
    }

    fn is_agent(&self, sender: &str) -> bool {
        sender.starts_with(&self.agent_prefix) || sender.eq_ignore_ascii_case(&self.agent_prefix)
    }

    /// メッセージをログへ追加する。常に成功する。
    ///
    /// 上限に達している場合は最古のメッセージを退避し、残りの turn を
    /// 1 始まりの密な連番に振り直してから追加します。送信者が自動応答で
    /// なければプロファイルも更新します（ログへの追加はスキップしない）。
    pub fn add_message(&mut self, sender: &str, text: &str, timestamp: i64) {
        if self.messages.len() >= MAX_MESSAGES_PER_ROOM {
            self.messages.pop_front();
            for (i, msg) in self.messages.iter_mut().enumerate() {
                msg.turn = i + 1;
            }
        }

        let turn = self.messages.len() + 1;
        self.messages.push_back(ContextMessage {
            sender: sender.to_string(),
            text: text.to_string(),
            timestamp,
            turn,
        });
        self.last_activity = timestamp;

        if !self.is_agent(sender) {
            let profile = self
                .user_profiles
                .entry(sender.to_string())
                .or_insert_with(|| UserProfile::new(timestamp));
            profile.message_count += 1;
            profile.last_message_at = timestamp;
            profile.total_chars += text.chars().count();
            profile.avg_message_length = profile.total_chars as f64 / profile.message_count as f64;

            let keywords = Self::extract_keywords(text);
            profile.keywords.extend(keywords);
            if profile.keywords.len() > MAX_KEYWORDS_PER_USER {
                let excess = profile.keywords.len() - MAX_KEYWORDS_PER_USER;
                profile.keywords.drain(..excess);
            }
        }
    }

    /// メッセージからキーワードを抽出する
    ///
    /// 小文字化して空白で分割し、前後の記号を落とした上で、長さ 2 以下の
    /// トークンとストップワードを除外する。メッセージ内の重複は最初の
    /// 出現だけを残す。
    pub fn extract_keywords(text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut keywords = Vec::new();
        for token in text.to_lowercase().split_whitespace() {
            let word = token.trim_matches(|c: char| !c.is_alphanumeric());
            if word.len() <= 2 || STOPWORDS.contains(word) {
                continue;
            }
            if seen.insert(word.to_string()) {
                keywords.push(word.to_string());
            }
        }
        keywords
    }

    /// 会話の継続時間を粗い単位で整形する
    fn duration_label(&self) -> String {
        let (Some(first), Some(last)) = (self.messages.front(), self.messages.back()) else {
            return "Not started".to_string();
        };

        let total_seconds = ((last.timestamp - first.timestamp) / 1000).max(0);
        let days = total_seconds / 86_400;
        let rem = total_seconds % 86_400;
        if days > 0 {
            format!("{} days, {} hours", days, rem / 3600)
        } else if total_seconds >= 3600 {
            format!("{}h {}m", total_seconds / 3600, (total_seconds % 3600) / 60)
        } else if total_seconds >= 60 {
            format!("{}m {}s", total_seconds / 60, total_seconds % 60)
        } else {
            format!("{}s", total_seconds)
        }
    }

    /// 返信生成器へ渡す会話サマリを組み立てる
    ///
    /// 参加者一覧・総ターン数・継続時間・最終活動時刻・直近 `num_messages`
    /// 件のメッセージ原文・参加者ごとの統計（直近 5 件の重複なし
    /// キーワードを含む）で構成されます。
    pub fn get_context_summary(&self, num_messages: usize) -> String {
        if self.messages.is_empty() {
            return format!(
                "## Conversation Context (Room: {})\nNo messages yet.",
                self.room_id
            );
        }

        let recent = self.recent_messages(num_messages);
        let participants = if self.user_profiles.is_empty() {
            "None".to_string()
        } else {
            self.user_profiles
                .keys()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut context = format!(
            "\n## Conversation Context (Room: {})\n\n\
             **Participants**: {}\n\
             **Total Turns**: {}\n\
             **Duration**: {}\n\
             **Last Activity**: {}\n\n\
             ### Recent {} Messages:\n",
            self.room_id,
            participants,
            self.messages.len(),
            self.duration_label(),
            format_datetime(self.last_activity),
            recent.len(),
        );

        for msg in &recent {
            context.push_str(&format!("\n[{}] **{}**: {}", msg.turn, msg.sender, msg.text));
        }

        if !self.user_profiles.is_empty() {
            context.push_str("\n\n### User Information:");
            for (user, profile) in &self.user_profiles {
                let skip = profile.keywords.len().saturating_sub(5);
                let mut seen = HashSet::new();
                let recent_keywords: Vec<&str> = profile.keywords[skip..]
                    .iter()
                    .filter(|k| seen.insert(k.as_str()))
                    .map(|k| k.as_str())
                    .collect();
                let keywords_str = if recent_keywords.is_empty() {
                    "None".to_string()
                } else {
                    recent_keywords.join(", ")
                };

                context.push_str(&format!(
                    "\n- **{}**: {} messages, Avg length: {:.1} chars, Recent keywords: {}",
                    user, profile.message_count, profile.avg_message_length, keywords_str
                ));
            }
        }

        context
    }

    /// 会話統計を取得する
    pub fn get_statistics(&self, now_millis: i64) -> ContextStatistics {
        let total_chars: usize = self.messages.iter().map(|m| m.text.chars().count()).sum();
        let avg = if self.messages.is_empty() {
            0.0
        } else {
            total_chars as f64 / self.messages.len() as f64
        };

        ContextStatistics {
            room_id: self.room_id.clone(),
            total_messages: self.messages.len(),
            total_participants: self.user_profiles.len(),
            total_characters: total_chars,
            average_message_length: (avg * 10.0).round() / 10.0,
            participant_messages: self
                .user_profiles
                .iter()
                .map(|(user, profile)| (user.clone(), profile.message_count))
                .collect(),
            duration: self.duration_label(),
            created_at: timestamp_to_rfc3339(self.created_at),
            last_activity: timestamp_to_rfc3339(self.last_activity),
            is_active: (now_millis - self.last_activity) / 1000 < ACTIVE_WINDOW_SECONDS,
        }
    }

    /// エクスポート用スナップショットを生成する
    ///
    /// 統計は切り詰め前の全ログから先に計算し、メッセージだけを
    /// 直近 `EXPORT_MESSAGE_LIMIT` 件に制限します。
    pub fn snapshot(&self, now_millis: i64) -> ContextSnapshot {
        let summary = self.get_statistics(now_millis);
        ContextSnapshot {
            room_id: self.room_id.clone(),
            created_at: timestamp_to_rfc3339(self.created_at),
            last_activity: timestamp_to_rfc3339(self.last_activity),
            messages: self.recent_messages(EXPORT_MESSAGE_LIMIT),
            user_profiles: self.user_profiles.clone(),
            total_turns: self.messages.len(),
            active_participants: self.user_profiles.len(),
            summary,
        }
    }
}

/// 全ルームのコンテキストの統計
#[derive(Debug, Clone, Serialize)]
pub struct GlobalStatistics {
    pub total_rooms: usize,
    pub total_messages: usize,
    pub total_users: usize,
    pub avg_messages_per_room: f64,
    pub active_rooms: Vec<RoomId>,
    pub room_ids: Vec<RoomId>,
}

/// 全ルームの ConversationContext を管理するレジストリ
///
/// コンテキストはルームの最初のメッセージ（または接続）で遅延生成され、
/// ルーム終了か非活動タイムアウトでメモリから取り除かれます。取り除かれた
/// コンテキストは呼び出し元が永続化（アーカイブ）します。
#[derive(Debug, Default)]
pub struct ContextRegistry {
    contexts: HashMap<RoomId, ConversationContext>,
}

impl ContextRegistry {
    /// 新しい ContextRegistry を作成
    pub fn new() -> Self {
        Self::default()
    }

    /// コンテキストを取得（無ければ作成）
    ///
    /// 既存コンテキストの場合も最終活動時刻と自動応答プレフィックスを
    /// 最新の値へ更新する。
    pub fn get_or_create(
        &mut self,
        room_id: &RoomId,
        agent_prefix: &str,
        now_millis: i64,
    ) -> &mut ConversationContext {
        let context = self
            .contexts
            .entry(room_id.clone())
            .or_insert_with(|| ConversationContext::new(room_id.clone(), now_millis));
        context.touch(now_millis);
        context.set_agent_prefix(agent_prefix);
        context
    }

    pub fn get(&self, room_id: &RoomId) -> Option<&ConversationContext> {
        self.contexts.get(room_id)
    }

    pub fn get_mut(&mut self, room_id: &RoomId) -> Option<&mut ConversationContext> {
        self.contexts.get_mut(room_id)
    }

    /// コンテキストを取り除いて返す（アーカイブは呼び出し元の責務）
    pub fn remove(&mut self, room_id: &RoomId) -> Option<ConversationContext> {
        self.contexts.remove(room_id)
    }

    /// 非活動のコンテキストを取り除いて返す
    pub fn remove_inactive(
        &mut self,
        max_inactive_minutes: i64,
        now_millis: i64,
    ) -> Vec<ConversationContext> {
        let threshold_millis = max_inactive_minutes * 60 * 1000;
        let stale: Vec<RoomId> = self
            .contexts
            .iter()
            .filter(|(_, ctx)| now_millis - ctx.last_activity() > threshold_millis)
            .map(|(id, _)| id.clone())
            .collect();

        stale
            .iter()
            .filter_map(|id| self.contexts.remove(id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// 全コンテキストの統計を取得する
    pub fn global_statistics(&self, now_millis: i64) -> GlobalStatistics {
        let total_messages: usize = self.contexts.values().map(|c| c.message_count()).sum();
        let total_users: usize = self.contexts.values().map(|c| c.user_profiles().len()).sum();
        let mut active_rooms: Vec<RoomId> = self
            .contexts
            .iter()
            .filter(|(_, c)| (now_millis - c.last_activity()) / 1000 < ACTIVE_WINDOW_SECONDS)
            .map(|(id, _)| id.clone())
            .collect();
        active_rooms.sort();
        let mut room_ids: Vec<RoomId> = self.contexts.keys().cloned().collect();
        room_ids.sort();

        GlobalStatistics {
            total_rooms: self.contexts.len(),
            total_messages,
            total_users,
            avg_messages_per_room: if self.contexts.is_empty() {
                0.0
            } else {
                total_messages as f64 / self.contexts.len() as f64
            },
            active_rooms,
            room_ids,
        }
    }
}

fn format_datetime(timestamp_millis: i64) -> String {
    match Utc.timestamp_millis_opt(timestamp_millis) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => timestamp_millis.to_string(),
    }
}
