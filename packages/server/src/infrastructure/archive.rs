//! 会話スナップショットのアーカイブ
//!
//! ルーム終了時・非活動クリーンアップ時に ConversationContext の
//! スナップショットを JSON ファイルとして書き出します。アーカイブは
//! ベストエフォートで、失敗はログに残すだけです。

use std::path::PathBuf;

use chrono::{TimeZone, Utc};

use crate::domain::ContextSnapshot;

/// 会話スナップショットを JSON ファイルへ書き出すアーカイバ
#[derive(Debug, Clone)]
pub struct ContextArchive {
    /// 書き出し先ディレクトリ
    dir: PathBuf,
}

impl ContextArchive {
    /// 新しい ContextArchive を作成
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// スナップショットを `{room_id}_{日時}.json` として書き出す
    ///
    /// 書き出しに成功した場合はファイルパスを返す。失敗はログに残すだけで
    /// 呼び出し元の処理（ルーム終了など）を妨げない。
    pub async fn archive(&self, snapshot: &ContextSnapshot, now_millis: i64) -> Option<PathBuf> {
        let filename = format!(
            "{}_{}.json",
            snapshot.room_id,
            format_file_timestamp(now_millis)
        );
        let path = self.dir.join(filename);

        let contents = match serde_json::to_string_pretty(snapshot) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::error!("failed to serialize context snapshot: {}", e);
                return None;
            }
        };

        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            tracing::error!("failed to create archive directory: {}", e);
            return None;
        }

        match tokio::fs::write(&path, contents).await {
            Ok(()) => {
                tracing::info!(
                    "conversation archived: {} ({} messages)",
                    path.display(),
                    snapshot.total_turns
                );
                Some(path)
            }
            Err(e) => {
                tracing::error!("failed to archive conversation: {}", e);
                None
            }
        }
    }
}

fn format_file_timestamp(timestamp_millis: i64) -> String {
    match Utc.timestamp_millis_opt(timestamp_millis) {
        chrono::LocalResult::Single(dt) => dt.format("%Y%m%d_%H%M%S").to_string(),
        _ => timestamp_millis.to_string(),
    }
}
