//! AWS provider error types

use modelship_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("aws CLI not found. Please install: https://aws.amazon.com/cli/")]
    AwsCliNotFound,

    #[error("AWS authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("AWS resource not found: {0}")]
    NotFound(String),

    #[error("AWS resource already exists: {0}")]
    AlreadyExists(String),

    #[error("AWS resource is being updated, retry later: {0}")]
    UpdateInProgress(String),

    #[error("aws command failed: {0}")]
    CommandFailed(String),

    #[error("Unexpected aws output: {0}")]
    UnexpectedOutput(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AwsError {
    /// The same call may succeed once the resource settles
    pub fn is_retryable(&self) -> bool {
        matches!(self, AwsError::UpdateInProgress(_))
    }
}

impl From<AwsError> for CloudError {
    fn from(e: AwsError) -> Self {
        match e {
            AwsError::AwsCliNotFound => CloudError::AuthenticationFailed(e.to_string()),
            AwsError::AuthenticationFailed(msg) => CloudError::AuthenticationFailed(msg),
            AwsError::NotFound(msg) => CloudError::ResourceNotFound(msg),
            AwsError::AlreadyExists(msg) => CloudError::ResourceAlreadyExists(msg),
            AwsError::UpdateInProgress(msg) | AwsError::CommandFailed(msg) => {
                CloudError::CommandFailed(msg)
            }
            AwsError::UnexpectedOutput(msg) => CloudError::ApiError(msg),
            AwsError::JsonError(e) => CloudError::Json(e),
            AwsError::IoError(e) => CloudError::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, AwsError>;
