//! 管理者設定のスナップショット
//!
//! マッチングのグループサイズ、チャット時間、自動応答ボットの設定を保持します。
//! コアの各コンポーネントは設定をキャッシュせず、使用時点の最新値を
//! ConfigStore から読み直します（遅延実行中の設定変更を反映するため）。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// bot_name の最大文字数
const MAX_BOT_NAME_CHARS: usize = 50;

/// bot_delay の上限（秒）
const MAX_BOT_DELAY_SECONDS: u64 = 600;

/// 管理者設定のスナップショット
///
/// フィールドの既定値は運用実績のある値に合わせています。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// 1 ルームを構成する参加者数
    pub group_size: usize,
    /// チャットセッションの長さ（分）
    pub duration: u64,
    /// 自動応答ボットの有効フラグ
    pub bot_enabled: bool,
    /// ボットが返信するまでの遅延（秒）
    pub bot_delay: u64,
    /// ボットの表示名
    pub bot_name: String,
    /// ボットのシステムプロンプト（空なら既定のプロンプトが使われる）
    pub bot_prompt: String,
    /// マッチング待機のタイムアウト（秒）。クライアント側のポーリングが参照する
    pub match_timeout: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            group_size: 2,
            duration: 10,
            bot_enabled: true,
            bot_delay: 2,
            bot_name: "Bot".to_string(),
            bot_prompt: String::new(),
            match_timeout: 180,
        }
    }
}

/// 管理者設定の検証エラー
///
/// 設定・入力エラーは呼び出し元に返してよい唯一のエラー区分。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigValidationError {
    #[error("group_size must be at least 1 (got {0})")]
    InvalidGroupSize(usize),
    #[error("duration must be at least 1 minute (got {0})")]
    InvalidDuration(u64),
    #[error("bot_delay must be at most {MAX_BOT_DELAY_SECONDS} seconds (got {0})")]
    InvalidBotDelay(u64),
    #[error("bot_name must not be empty")]
    EmptyBotName,
    #[error("bot_name must be at most {MAX_BOT_NAME_CHARS} characters (got {0})")]
    BotNameTooLong(usize),
    #[error("match_timeout must be at least 1 second (got {0})")]
    InvalidMatchTimeout(u64),
}

impl AdminConfig {
    /// 設定値の型・範囲チェック
    ///
    /// ポリシーレベルの検証は行わず、明らかに不正な値だけを弾きます。
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.group_size < 1 {
            return Err(ConfigValidationError::InvalidGroupSize(self.group_size));
        }
        if self.duration < 1 {
            return Err(ConfigValidationError::InvalidDuration(self.duration));
        }
        if self.bot_delay > MAX_BOT_DELAY_SECONDS {
            return Err(ConfigValidationError::InvalidBotDelay(self.bot_delay));
        }
        if self.bot_name.trim().is_empty() {
            return Err(ConfigValidationError::EmptyBotName);
        }
        let name_chars = self.bot_name.chars().count();
        if name_chars > MAX_BOT_NAME_CHARS {
            return Err(ConfigValidationError::BotNameTooLong(name_chars));
        }
        if self.match_timeout < 1 {
            return Err(ConfigValidationError::InvalidMatchTimeout(
                self.match_timeout,
            ));
        }
        Ok(())
    }
}
