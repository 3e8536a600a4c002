//! Room エンティティ
//!
//! ひとつのチャットセッションを表します。メンバーは挿入順を保つ重複なしの
//! リスト、接続はライブなトランスポートハンドルの集合です。`bot_enabled` は
//! ルーム作成時点の設定スナップショットで、作成後の設定変更では変わりません
//! （遅延返信の有効判定は常に最新設定を読み直します）。

use serde::Serialize;

use super::id::{ConnectionId, ParticipantId, RoomId};

/// チャットルームのエンティティ
#[derive(Debug, Clone, Serialize)]
pub struct Room {
    /// ルーム ID
    pub id: RoomId,
    /// メンバーの参加者 ID（挿入順、重複なし）
    pub members: Vec<ParticipantId>,
    /// ライブなトランスポート接続
    pub connections: Vec<ConnectionId>,
    /// 作成時刻（Unix ミリ秒）
    pub created_at: i64,
    /// 作成時点でのボット有効フラグのスナップショット
    pub bot_enabled: bool,
}

impl Room {
    /// 新しい Room を作成
    ///
    /// 初期メンバーに重複があれば挿入順を保ったまま取り除きます。
    pub fn new(
        id: RoomId,
        members: Vec<ParticipantId>,
        created_at: i64,
        bot_enabled: bool,
    ) -> Self {
        let mut deduped: Vec<ParticipantId> = Vec::with_capacity(members.len());
        for member in members {
            if !deduped.contains(&member) {
                deduped.push(member);
            }
        }
        Self {
            id,
            members: deduped,
            connections: Vec::new(),
            created_at,
            bot_enabled,
        }
    }

    /// メンバーを追加（冪等）
    ///
    /// 既にメンバーであれば何もしない。追加した場合のみ true を返す。
    pub fn add_member(&mut self, participant: ParticipantId) -> bool {
        if self.members.contains(&participant) {
            return false;
        }
        self.members.push(participant);
        true
    }

    pub fn has_member(&self, participant: &ParticipantId) -> bool {
        self.members.contains(participant)
    }

    /// 接続を追加（既に登録済みなら何もしない）
    pub fn add_connection(&mut self, connection: ConnectionId) {
        if !self.connections.contains(&connection) {
            self.connections.push(connection);
        }
    }

    /// 接続を削除
    ///
    /// 切断経路の競合で二重に呼ばれることがあるため、存在しなければ
    /// no-op として false を返す。
    pub fn remove_connection(&mut self, connection: &ConnectionId) -> bool {
        let before = self.connections.len();
        self.connections.retain(|c| c != connection);
        self.connections.len() < before
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// ルームの経過時間（秒）
    pub fn age_seconds(&self, now_millis: i64) -> i64 {
        (now_millis - self.created_at) / 1000
    }
}
