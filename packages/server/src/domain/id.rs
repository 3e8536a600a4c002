//! 識別子の値オブジェクト
//!
//! 参加者 ID は接続ユーザーが名乗る不透明な文字列で、キュー・レジストリの
//! メンバーシップ以上の検証は行いません。Room ID はマッチ成立時にサーバーが
//! 生成するか、ロビーモードではクライアントが指定した文字列をそのまま使います。

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 参加者を一意に識別する不透明な文字列 ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// 新しい ParticipantId を作成
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ParticipantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// チャットルームの ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// 新しい RoomId を作成
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// マッチ成立時に使うランダムな RoomId を生成
    pub fn generate() -> Self {
        Self(format!("room_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RoomId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// 個々のトランスポート接続を識別する ID
///
/// 同じ参加者が複数の接続を張ることもあるため、参加者 ID とは独立に採番します。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// 新しい ConnectionId を採番
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
