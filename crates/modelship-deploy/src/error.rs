use crate::state::PipelineState;
use modelship_build::BuildError;
use modelship_cloud::CloudError;
use modelship_config::ConfigError;
use modelship_registry::RegistryError;
use std::fmt;
use thiserror::Error;

/// 1ステップの失敗原因
#[derive(Error, Debug)]
pub enum StepError {
    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

impl StepError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StepError::Cloud(e) => ErrorKind::of_cloud(e),
            StepError::Registry(e) => ErrorKind::of_registry(e),
            StepError::Build(_) => ErrorKind::Validation,
            StepError::Io(_) => ErrorKind::Internal,
        }
    }
}

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("検証エラー: {0}")]
    Validation(String),

    #[error("見つかりません: {0}")]
    NotFound(String),

    #[error(
        "{state} で失敗しました: {source}\n登録済みリソース: [{}]",
        .registered.join(", ")
    )]
    StepFailed {
        state: PipelineState,
        registered: Vec<String>,
        #[source]
        source: StepError,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("JSON エラー: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

/// 呼び出し側が対処を決めるためのエラー分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Provider,
    Timeout,
    DefinitiveFailure,
    NotFound,
    MalformedHandle,
    Authentication,
    Cancelled,
    Internal,
}

impl ErrorKind {
    fn of_cloud(e: &CloudError) -> Self {
        match e {
            CloudError::Validation(_) => ErrorKind::Validation,
            CloudError::ResourceNotFound(_) => ErrorKind::NotFound,
            CloudError::AuthenticationFailed(_) => ErrorKind::Authentication,
            CloudError::MalformedHandle(_) => ErrorKind::MalformedHandle,
            CloudError::Timeout { .. } => ErrorKind::Timeout,
            CloudError::DefinitiveFailure { .. } => ErrorKind::DefinitiveFailure,
            CloudError::Cancelled(_) => ErrorKind::Cancelled,
            CloudError::Io(_) | CloudError::Json(_) => ErrorKind::Internal,
            CloudError::ResourceAlreadyExists(_)
            | CloudError::ApiError(_)
            | CloudError::CommandFailed(_) => ErrorKind::Provider,
        }
    }

    fn of_registry(e: &RegistryError) -> Self {
        match e {
            RegistryError::Cloud(inner) => Self::of_cloud(inner),
            e if e.is_not_found() => ErrorKind::NotFound,
            RegistryError::DuplicateIteration(_) | RegistryError::DuplicateResource(_) => {
                ErrorKind::Validation
            }
            RegistryError::Remote(_) => ErrorKind::Provider,
            _ => ErrorKind::Internal,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Provider => "provider",
            ErrorKind::Timeout => "timeout",
            ErrorKind::DefinitiveFailure => "definitive-failure",
            ErrorKind::NotFound => "not-found",
            ErrorKind::MalformedHandle => "malformed-handle",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{}", name)
    }
}

impl DeployError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeployError::Validation(_) | DeployError::Config(_) | DeployError::Build(_) => {
                ErrorKind::Validation
            }
            DeployError::NotFound(_) => ErrorKind::NotFound,
            DeployError::StepFailed { source, .. } => source.kind(),
            DeployError::Registry(e) => ErrorKind::of_registry(e),
            DeployError::Cloud(e) => ErrorKind::of_cloud(e),
            DeployError::Io(_) | DeployError::Json(_) => ErrorKind::Internal,
        }
    }

    /// 失敗した状態と登録済みリソース（ステップ失敗時のみ）
    pub fn failed_step(&self) -> Option<(PipelineState, &[String])> {
        match self {
            DeployError::StepFailed {
                state, registered, ..
            } => Some((*state, registered.as_slice())),
            _ => None,
        }
    }
}

/// パイプライン外（update など）で起きたステップ単位のエラー
impl From<StepError> for DeployError {
    fn from(e: StepError) -> Self {
        match e {
            StepError::Cloud(e) => DeployError::Cloud(e),
            StepError::Registry(e) => DeployError::Registry(e),
            StepError::Build(e) => DeployError::Build(e),
            StepError::Io(e) => DeployError::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, DeployError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_failure_kind_follows_source() {
        let err = DeployError::StepFailed {
            state: PipelineState::ImageBuilt,
            registered: vec!["role1".into(), "ecr1".into()],
            source: StepError::Cloud(CloudError::DefinitiveFailure {
                step: "IMAGE_BUILT".into(),
                state: "FAILED".into(),
            }),
        };
        assert_eq!(err.kind(), ErrorKind::DefinitiveFailure);
        let message = err.to_string();
        assert!(message.contains("IMAGE_BUILT"));
        assert!(message.contains("role1, ecr1"));

        let (state, registered) = err.failed_step().unwrap();
        assert_eq!(state, PipelineState::ImageBuilt);
        assert_eq!(registered.len(), 2);
    }

    #[test]
    fn test_registry_not_found_kind() {
        let err = DeployError::from(RegistryError::IterationNotFound("x".into()));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = DeployError::from(RegistryError::Cloud(CloudError::AuthenticationFailed(
            "expired".into(),
        )));
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }
}
