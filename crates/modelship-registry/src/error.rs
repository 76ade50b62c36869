//! Registry エラー型

use crate::remote::RemoteError;
use modelship_cloud::CloudError;

/// Project / Iteration / Resource 操作のエラー
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Iteration '{0}' が見つかりません")]
    IterationNotFound(String),

    #[error("Resource '{0}' が見つかりません")]
    ResourceNotFound(String),

    #[error("Iteration '{0}' は既に存在します")]
    DuplicateIteration(String),

    #[error("Resource '{0}' は既に登録されています")]
    DuplicateResource(String),

    #[error("不正なプロジェクトドキュメント: {0}")]
    InvalidDocument(String),

    #[error("プロジェクトファイルが見つかりません: {0}")]
    ProjectFileNotFound(String),

    #[error("プロジェクトはロック中です: {0}")]
    Locked(String),

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error("リモート同期エラー: {0}")]
    Remote(#[from] RemoteError),

    #[error("JSON エラー: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

impl RegistryError {
    /// 指定した iteration / resource が registry に無い
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RegistryError::IterationNotFound(_) | RegistryError::ResourceNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
