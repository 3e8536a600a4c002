//! ファイル永続化付きの管理者設定ストア
//!
//! ## 責務
//!
//! - AdminConfig の共有・ホットリロード
//! - JSON ファイルからの読み込みと更新時の保存
//!
//! ## 設計ノート
//!
//! コアの各コンポーネントはこのストアから `snapshot()` で設定を読み直します。
//! スナップショットはクローンなので、ロックガードを await を跨いで保持する
//! ことはありません。更新は検証を通過した場合だけ反映し、ファイル保存の
//! 失敗はログに残すだけで呼び出し元へは返しません（設定はメモリ上の値が正）。

use std::path::PathBuf;

use tokio::sync::RwLock;

use crate::domain::{AdminConfig, ConfigValidationError};

/// ファイル永続化付きの管理者設定ストア
#[derive(Debug)]
pub struct ConfigStore {
    inner: RwLock<AdminConfig>,
    /// 永続化先のファイルパス（None なら永続化しない）
    path: Option<PathBuf>,
}

impl ConfigStore {
    /// 永続化なしの ConfigStore を作成（テスト・組み込み用）
    pub fn new(config: AdminConfig) -> Self {
        Self {
            inner: RwLock::new(config),
            path: None,
        }
    }

    /// ファイルから設定を読み込んで ConfigStore を作成
    ///
    /// ファイルが存在しない・壊れている場合は既定値で起動し、
    /// 最初の保存でファイルが作られる。
    pub async fn load_or_default(path: PathBuf) -> Self {
        let config = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => match serde_json::from_str::<AdminConfig>(&contents) {
                Ok(config) => {
                    tracing::info!("admin config loaded from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "failed to parse config file {}, using defaults: {}",
                        path.display(),
                        e
                    );
                    AdminConfig::default()
                }
            },
            Err(_) => {
                tracing::info!(
                    "config file not found at {}, using defaults (file will be created on first save)",
                    path.display()
                );
                AdminConfig::default()
            }
        };

        Self {
            inner: RwLock::new(config),
            path: Some(path),
        }
    }

    /// 現在の設定のスナップショットを取得する
    pub async fn snapshot(&self) -> AdminConfig {
        self.inner.read().await.clone()
    }

    /// 設定を検証して反映し、ファイルへ保存する
    ///
    /// 検証エラーは呼び出し元へ返す（設定・入力エラーは表面化してよい
    /// 唯一の区分）。保存の失敗はログに残すだけ。
    pub async fn update(&self, new_config: AdminConfig) -> Result<(), ConfigValidationError> {
        new_config.validate()?;

        {
            let mut config = self.inner.write().await;
            *config = new_config;
        }
        tracing::info!("admin config updated");

        self.save().await;
        Ok(())
    }

    async fn save(&self) {
        let Some(path) = &self.path else {
            return;
        };

        let config = self.snapshot().await;
        let contents = match serde_json::to_string_pretty(&config) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::error!("failed to serialize admin config: {}", e);
                return;
            }
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    tracing::error!("failed to create config directory: {}", e);
                    return;
                }
            }
        }

        match tokio::fs::write(path, contents).await {
            Ok(()) => tracing::info!("admin config saved to {}", path.display()),
            Err(e) => tracing::error!("failed to save admin config: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "tsunagi_config_test_{}_{}.json",
            name,
            uuid::Uuid::new_v4().simple()
        ))
    }

    #[tokio::test]
    async fn test_snapshot_returns_current_config() {
        // テスト項目: snapshot が現在の設定のクローンを返す
        // given (前提条件):
        let store = ConfigStore::new(AdminConfig::default());

        // when (操作):
        let snapshot = store.snapshot().await;

        // then (期待する結果):
        assert_eq!(snapshot, AdminConfig::default());
    }

    #[tokio::test]
    async fn test_update_applies_valid_config() {
        // テスト項目: 検証を通過した設定が反映される
        // given (前提条件):
        let store = ConfigStore::new(AdminConfig::default());
        let new_config = AdminConfig {
            group_size: 3,
            bot_enabled: false,
            ..AdminConfig::default()
        };

        // when (操作):
        let result = store.update(new_config.clone()).await;

        // then (期待する結果):
        assert!(result.is_ok());
        assert_eq!(store.snapshot().await, new_config);
    }

    #[tokio::test]
    async fn test_update_rejects_invalid_config() {
        // テスト項目: 検証に失敗した設定は反映されない
        // given (前提条件):
        let store = ConfigStore::new(AdminConfig::default());
        let invalid = AdminConfig {
            group_size: 0,
            ..AdminConfig::default()
        };

        // when (操作):
        let result = store.update(invalid).await;

        // then (期待する結果): エラーが返り、設定は既定値のまま
        assert_eq!(result, Err(ConfigValidationError::InvalidGroupSize(0)));
        assert_eq!(store.snapshot().await.group_size, 2);
    }

    #[tokio::test]
    async fn test_load_or_default_with_missing_file() {
        // テスト項目: ファイルが無い場合は既定値で起動する
        // given (前提条件):
        let path = temp_config_path("missing");

        // when (操作):
        let store = ConfigStore::load_or_default(path).await;

        // then (期待する結果):
        assert_eq!(store.snapshot().await, AdminConfig::default());
    }

    #[tokio::test]
    async fn test_update_persists_and_reloads() {
        // テスト項目: 更新が保存され、別の ConfigStore で読み直せる
        // given (前提条件):
        let path = temp_config_path("roundtrip");
        let store = ConfigStore::load_or_default(path.clone()).await;
        let new_config = AdminConfig {
            group_size: 4,
            bot_name: "Kaiwa".to_string(),
            ..AdminConfig::default()
        };

        // when (操作):
        store.update(new_config.clone()).await.unwrap();
        let reloaded = ConfigStore::load_or_default(path.clone()).await;

        // then (期待する結果):
        assert_eq!(reloaded.snapshot().await, new_config);

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_load_or_default_with_corrupt_file() {
        // テスト項目: 壊れたファイルは既定値へ縮退する
        // given (前提条件):
        let path = temp_config_path("corrupt");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        // when (操作):
        let store = ConfigStore::load_or_default(path.clone()).await;

        // then (期待する結果):
        assert_eq!(store.snapshot().await, AdminConfig::default());

        let _ = tokio::fs::remove_file(&path).await;
    }
}
