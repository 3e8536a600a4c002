//! RoomRegistry: ルームと逆引きインデックスの管理
//!
//! ## 責務
//!
//! - ルームのライフサイクル（作成・メンバー追加・接続管理・終了）
//! - `user_to_room` 逆引きインデックスの整合性維持
//!
//! ## 設計ノート
//!
//! ルームのライフサイクルは切断処理と競合するのが定常状態なので、存在しない
//! ルームへの操作はすべて no-op / 空結果に縮退し、呼び出し元へエラーを
//! 返しません。`rooms` と `user_to_room` は必ず同じ操作の中で一緒に更新し、
//! 片方だけを書き換えることはありません。

use std::collections::HashMap;

use serde::Serialize;

use super::id::{ConnectionId, ParticipantId, RoomId};
use super::room::Room;

/// ルーム状態のスナップショット（問い合わせ応答用）
#[derive(Debug, Clone, Serialize)]
pub struct RoomStatus {
    pub room_id: RoomId,
    pub members: Vec<ParticipantId>,
    pub connection_count: usize,
    pub bot_enabled: bool,
    pub created_at: i64,
    pub age_seconds: i64,
}

/// アクティブなルームと参加者の逆引きインデックスを管理するレジストリ
#[derive(Debug, Default)]
pub struct RoomRegistry {
    /// room_id -> Room
    rooms: HashMap<RoomId, Room>,
    /// 参加者 -> 所属ルームの逆引きインデックス
    user_to_room: HashMap<ParticipantId, RoomId>,
}

impl RoomRegistry {
    /// 新しい RoomRegistry を作成
    pub fn new() -> Self {
        Self::default()
    }

    /// ルームを作成（ID で冪等）
    ///
    /// 既に同じ ID のルームが存在する場合は初期化し直さずそのまま返します。
    /// ロビーモードの遅延作成や重複した作成呼び出しで、ライブな接続を
    /// 持つルームを壊さないためです。
    pub fn create_room(
        &mut self,
        room_id: RoomId,
        members: Vec<ParticipantId>,
        created_at: i64,
        bot_enabled: bool,
    ) -> &Room {
        if !self.rooms.contains_key(&room_id) {
            let room = Room::new(room_id.clone(), members, created_at, bot_enabled);
            for member in &room.members {
                self.user_to_room.insert(member.clone(), room_id.clone());
            }
            self.rooms.insert(room_id.clone(), room);
        }
        &self.rooms[&room_id]
    }

    pub fn contains(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// 参加者が所属するルーム ID を逆引き
    pub fn room_of(&self, participant: &ParticipantId) -> Option<&RoomId> {
        self.user_to_room.get(participant)
    }

    /// メンバーを追加（冪等）
    ///
    /// ルームが存在しなければ no-op。追加時は逆引きインデックスも更新する。
    pub fn add_member(&mut self, room_id: &RoomId, participant: ParticipantId) -> bool {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return false;
        };
        let added = room.add_member(participant.clone());
        self.user_to_room.insert(participant, room_id.clone());
        added
    }

    /// 接続を追加（ルームが存在しなければ no-op）
    pub fn add_connection(&mut self, room_id: &RoomId, connection: ConnectionId) {
        if let Some(room) = self.rooms.get_mut(room_id) {
            room.add_connection(connection);
        }
    }

    /// 接続を削除（ルーム・接続が存在しなければ no-op）
    pub fn remove_connection(&mut self, room_id: &RoomId, connection: &ConnectionId) {
        if let Some(room) = self.rooms.get_mut(room_id) {
            room.remove_connection(connection);
        }
    }

    /// ルームの現在の接続一覧（ルームが存在しなければ空）
    pub fn connections(&self, room_id: &RoomId) -> Vec<ConnectionId> {
        self.rooms
            .get(room_id)
            .map(|room| room.connections.clone())
            .unwrap_or_default()
    }

    /// ルームのメンバー一覧（ルームが存在しなければ空）
    pub fn members(&self, room_id: &RoomId) -> Vec<ParticipantId> {
        self.rooms
            .get(room_id)
            .map(|room| room.members.clone())
            .unwrap_or_default()
    }

    /// ルーム状態のスナップショットを取得
    pub fn status(&self, room_id: &RoomId, now_millis: i64) -> Option<RoomStatus> {
        self.rooms.get(room_id).map(|room| RoomStatus {
            room_id: room.id.clone(),
            members: room.members.clone(),
            connection_count: room.connection_count(),
            bot_enabled: room.bot_enabled,
            created_at: room.created_at,
            age_seconds: room.age_seconds(now_millis),
        })
    }

    /// ルームを終了する
    ///
    /// 全メンバーの逆引きインデックスを外してからルームを削除します。
    /// 存在しないルームに対しては no-op（None を返す）。
    pub fn end_room(&mut self, room_id: &RoomId) -> Option<Room> {
        let room = self.rooms.remove(room_id)?;
        for member in &room.members {
            // 逆引きが別のルームを指している場合は触らない
            if self.user_to_room.get(member) == Some(room_id) {
                self.user_to_room.remove(member);
            }
        }
        Some(room)
    }

    /// アクティブなルーム ID の一覧
    pub fn room_ids(&self) -> Vec<RoomId> {
        let mut ids: Vec<RoomId> = self.rooms.keys().cloned().collect();
        // Sort for consistent ordering
        ids.sort();
        ids
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// 全ルームのメンバー数合計
    pub fn total_members(&self) -> usize {
        self.rooms.values().map(|room| room.members.len()).sum()
    }
}
