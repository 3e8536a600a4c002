//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use crate::domain::{AdminConfig, ParticipantId, RoomId};
use crate::usecase::MatchOutcome;
use tsunagi_shared::time::timestamp_to_rfc3339;

use super::super::state::AppState;

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

// ============ Matching ============

fn default_condition() -> String {
    "default".to_string()
}

/// Query parameters for the polling match endpoint
#[derive(Debug, Deserialize)]
pub struct MatchQuery {
    pub uid: String,
    #[serde(default = "default_condition")]
    pub condition: String,
}

/// Response body for the polling match endpoint
#[derive(Debug, Serialize)]
pub struct MatchResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partner_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub partners: Vec<String>,
}

/// Check match status and join the queue if not matched.
///
/// Polling semantics: a participant who already owns a room re-discovers
/// it here instead of being queued again.
pub async fn match_participant(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MatchQuery>,
) -> Json<MatchResponse> {
    let participant = ParticipantId::new(query.uid);
    let outcome = state
        .join_queue_usecase
        .execute(participant, &query.condition)
        .await;

    match outcome {
        MatchOutcome::Matched { room_id, partners } => {
            let partners: Vec<String> =
                partners.into_iter().map(|p| p.as_str().to_string()).collect();
            Json(MatchResponse {
                status: "matched",
                room_id: Some(room_id.as_str().to_string()),
                partner_id: partners.first().cloned(),
                partners,
            })
        }
        MatchOutcome::Waiting => Json(MatchResponse {
            status: "waiting",
            room_id: None,
            partner_id: None,
            partners: Vec::new(),
        }),
    }
}

/// Request body for leaving the queue
#[derive(Debug, Deserialize)]
pub struct LeaveQueueRequest {
    pub uid: String,
    #[serde(default = "default_condition")]
    pub condition: String,
}

/// Leave the matching queue (idempotent).
pub async fn leave_queue(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LeaveQueueRequest>,
) -> Json<serde_json::Value> {
    state
        .leave_queue_usecase
        .execute(&ParticipantId::new(request.uid), &request.condition)
        .await;
    Json(serde_json::json!({"status": "ok"}))
}

// ============ Rooms ============

/// Room status response
#[derive(Debug, Serialize)]
pub struct RoomStatusDto {
    pub room_id: String,
    pub members: Vec<String>,
    pub connection_count: usize,
    pub bot_enabled: bool,
    pub created_at: String,
    pub age_seconds: i64,
}

/// Get room status by ID
pub async fn get_room_status(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomStatusDto>, StatusCode> {
    let status = state
        .room_query_usecase
        .status(&RoomId::new(room_id))
        .await
        .ok_or(StatusCode::NOT_FOUND)?;

    // Domain Model から DTO への変換
    Ok(Json(RoomStatusDto {
        room_id: status.room_id.as_str().to_string(),
        members: status
            .members
            .iter()
            .map(|m| m.as_str().to_string())
            .collect(),
        connection_count: status.connection_count,
        bot_enabled: status.bot_enabled,
        created_at: timestamp_to_rfc3339(status.created_at),
        age_seconds: status.age_seconds,
    }))
}

/// Query parameters carrying a message limit
#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

/// Get persisted room history (oldest first)
pub async fn get_room_history(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Json<serde_json::Value> {
    let room_id = RoomId::new(room_id);
    let history = state
        .room_query_usecase
        .history(&room_id, query.limit.unwrap_or(50))
        .await;
    let total = history.len();
    Json(serde_json::json!({
        "room_id": room_id,
        "messages": history,
        "total": total,
    }))
}

// ============ Admin: configuration ============

/// Get current admin configuration
pub async fn get_admin_config(State(state): State<Arc<AppState>>) -> Json<AdminConfig> {
    Json(state.admin_usecase.get_config().await)
}

/// Update admin configuration.
///
/// Validation errors are the one error category surfaced to the caller.
pub async fn set_admin_config(
    State(state): State<Arc<AppState>>,
    Json(new_config): Json<AdminConfig>,
) -> Result<Json<AdminConfig>, (StatusCode, Json<serde_json::Value>)> {
    match state.admin_usecase.update_config(new_config).await {
        Ok(applied) => Ok(Json(applied)),
        Err(e) => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({"status": "error", "message": e.to_string()})),
        )),
    }
}

// ============ Admin: dashboard ============

#[derive(Debug, Serialize)]
struct RoomOverviewDto {
    id: String,
    participants: Vec<String>,
    created_at: String,
    connections: usize,
    bot_enabled: bool,
    message_count: usize,
    age_seconds: i64,
}

/// Get all active rooms for the dashboard
pub async fn get_admin_rooms(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let overview = state.room_query_usecase.overview().await;
    let config = state.admin_usecase.get_config().await;

    let rooms: Vec<RoomOverviewDto> = overview
        .rooms
        .into_iter()
        .map(|room| RoomOverviewDto {
            id: room.id.as_str().to_string(),
            participants: room
                .participants
                .iter()
                .map(|p| p.as_str().to_string())
                .collect(),
            created_at: timestamp_to_rfc3339(room.created_at),
            connections: room.connections,
            bot_enabled: room.bot_enabled,
            message_count: room.message_count,
            age_seconds: room.age_seconds,
        })
        .collect();

    Json(serde_json::json!({
        "rooms": rooms,
        "bot_enabled": config.bot_enabled,
        "total_rooms": overview.total_rooms,
        "total_users": overview.total_users,
        "total_messages": overview.total_messages,
    }))
}

/// Get recent messages of a room
pub async fn get_room_messages(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Json<serde_json::Value> {
    let messages = state
        .room_query_usecase
        .messages(&RoomId::new(room_id), query.limit.unwrap_or(100))
        .await;
    Json(serde_json::json!(messages))
}

/// End a room (admin operation, idempotent)
pub async fn end_room_admin(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let room_id = RoomId::new(room_id);
    if state.end_room_usecase.execute(&room_id).await {
        Ok(Json(serde_json::json!({
            "status": "success",
            "message": format!("Room {} ended", room_id),
        })))
    } else {
        Err((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"status": "error", "message": "Room not found"})),
        ))
    }
}

/// Get admin statistics
pub async fn get_admin_stats(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let stats = state.admin_usecase.stats().await;
    Json(serde_json::json!(stats))
}

/// Reset all agent instances
pub async fn reset_all_agents(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let count = state.admin_usecase.reset_agents().await;
    Json(serde_json::json!({"status": "success", "reset_count": count}))
}

/// Clean up inactive rooms and conversation contexts
pub async fn cleanup_inactive_rooms(
    State(state): State<Arc<AppState>>,
) -> Json<serde_json::Value> {
    // ルームは作成から 1 時間、コンテキストは 60 分の非活動で掃除する
    let report = state.admin_usecase.cleanup(1, 60).await;
    Json(serde_json::json!({
        "status": "success",
        "message": format!(
            "Cleaned {} inactive rooms and {} inactive contexts",
            report.cleaned_rooms, report.cleaned_contexts
        ),
        "cleaned_rooms": report.cleaned_rooms,
        "cleaned_contexts": report.cleaned_contexts,
    }))
}

// ============ Admin: export ============

fn default_export_format() -> String {
    "csv".to_string()
}

/// Query parameters for chat history export
#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default = "default_export_format")]
    pub format: String,
}

/// Export a room's chat history as CSV or JSON
pub async fn export_room_history(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let room_id = RoomId::new(room_id);
    let Some((snapshot, members)) = state.room_query_usecase.export_snapshot(&room_id).await
    else {
        return Err((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "status": "error",
                "message": "Room not found or no messages",
            })),
        ));
    };

    let participants: Vec<String> = members.iter().map(|m| m.as_str().to_string()).collect();
    let stamp = file_stamp(&snapshot.last_activity);

    match query.format.to_lowercase().as_str() {
        "csv" => {
            let mut csv_lines = vec![
                format!("Room ID,{}", room_id),
                format!("Participants,{}", participants.join("; ")),
                format!("Total Messages,{}", snapshot.total_turns),
                format!("Created At,{}", snapshot.created_at),
                format!("Last Activity,{}", snapshot.last_activity),
                String::new(),
                "Timestamp,Sender,Message,Turn".to_string(),
            ];
            for msg in &snapshot.messages {
                let text = msg.text.replace('"', "\"\"");
                csv_lines.push(format!(
                    "\"{}\",\"{}\",\"{}\",{}",
                    timestamp_to_rfc3339(msg.timestamp),
                    msg.sender,
                    text,
                    msg.turn
                ));
            }

            Ok(Json(serde_json::json!({
                "status": "success",
                "room_id": room_id.as_str(),
                "format": "csv",
                "content": csv_lines.join("\n"),
                "filename": format!("chat_history_{}_{}.csv", room_id, stamp),
            })))
        }
        "json" => Ok(Json(serde_json::json!({
            "status": "success",
            "room_id": room_id.as_str(),
            "format": "json",
            "data": {
                "room_info": {
                    "room_id": room_id.as_str(),
                    "participants": participants,
                    "created_at": snapshot.created_at,
                    "last_activity": snapshot.last_activity,
                    "total_messages": snapshot.total_turns,
                },
                "messages": snapshot.messages,
                "statistics": snapshot.summary,
            },
            "filename": format!("chat_history_{}_{}.json", room_id, stamp),
        }))),
        _ => Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "status": "error",
                "message": "Unsupported format. Use 'csv' or 'json'.",
            })),
        )),
    }
}

/// RFC 3339 の日時からファイル名に使える刻印を作る
fn file_stamp(rfc3339: &str) -> String {
    rfc3339
        .chars()
        .filter(|c| c.is_ascii_digit())
        .take(14)
        .collect()
}
