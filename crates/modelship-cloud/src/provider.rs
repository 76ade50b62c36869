//! Cloud provider trait definition

use crate::error::{CloudError, Result};
use crate::handle::{
    ApiRef, BuildProjectRef, FunctionRef, ProviderHandle, RegistryRef, ResourceKind, RoleRef,
    ScheduleRef, StoreRef,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cloud provider abstraction trait
///
/// The deployment pipeline only talks to a provider through this trait.
/// Every `create_*` call either returns a reference the caller can register
/// or fails without leaving partial state behind.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Returns the provider name (e.g., "aws")
    fn name(&self) -> &str;

    /// Returns the provider display name for UI
    fn display_name(&self) -> &str;

    /// Region new resources are created in
    fn region(&self) -> &str;

    /// Check if the provider is properly configured and authenticated
    async fn check_auth(&self) -> Result<AuthStatus>;

    async fn create_execution_role(&self, name: &str) -> Result<RoleRef>;

    async fn create_image_registry(&self, name: &str) -> Result<RegistryRef>;

    async fn create_object_store(&self, name: &str) -> Result<StoreRef>;

    async fn upload_object(&self, store: &StoreRef, key: &str, body: &[u8]) -> Result<()>;

    /// Create a build project that builds `source_location` and pushes to `registry`
    async fn create_build_project(
        &self,
        name: &str,
        role: &RoleRef,
        source_location: &str,
        registry: &RegistryRef,
    ) -> Result<BuildProjectRef>;

    /// Start a build, returning the build id
    async fn start_build(&self, project: &BuildProjectRef) -> Result<String>;

    async fn poll_build_status(&self, build_id: &str) -> Result<BuildStatus>;

    /// URI of the image most recently pushed to the registry
    async fn get_image_uri(&self, registry: &RegistryRef) -> Result<String>;

    async fn create_function(
        &self,
        name: &str,
        role: &RoleRef,
        image_uri: &str,
    ) -> Result<FunctionRef>;

    async fn update_function_image(&self, function: &FunctionRef, image_uri: &str) -> Result<()>;

    async fn poll_function_state(&self, function_name: &str) -> Result<FunctionState>;

    /// Integration URI an API front door uses to invoke the function
    fn function_integration_uri(&self, function: &FunctionRef) -> String;

    async fn create_api(
        &self,
        name: &str,
        description: &str,
        integration_uri: &str,
    ) -> Result<ApiRef>;

    async fn grant_invoke_permission(&self, api: &ApiRef, function: &FunctionRef) -> Result<()>;

    /// Deploy the API to `stage`, returning the public URL
    async fn create_deployment_stage(&self, api: &ApiRef, stage: &str) -> Result<String>;

    async fn create_schedule_rule(
        &self,
        name: &str,
        target: &FunctionRef,
        schedule_expression: &str,
    ) -> Result<ScheduleRef>;

    /// Current provider-side status of a registered resource
    async fn describe(&self, handle: &ProviderHandle) -> Result<ResourceStatus>;

    /// Destroy a registered resource.
    ///
    /// Returns `CloudError::ResourceNotFound` when the provider does not know it.
    async fn destroy(&self, handle: &ProviderHandle) -> Result<()>;
}

/// Per-kind lifecycle client composed into a provider
#[async_trait]
pub trait CloudResource: Send + Sync {
    fn kind(&self) -> ResourceKind;

    async fn describe(&self, handle: &ProviderHandle) -> Result<ResourceStatus>;

    async fn destroy(&self, handle: &ProviderHandle) -> Result<()>;
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// Image build status as reported by the build service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    InProgress,
    Succeeded,
    Failed,
    Fault,
    Stopped,
    TimedOut,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::InProgress => "IN_PROGRESS",
            BuildStatus::Succeeded => "SUCCEEDED",
            BuildStatus::Failed => "FAILED",
            BuildStatus::Fault => "FAULT",
            BuildStatus::Stopped => "STOPPED",
            BuildStatus::TimedOut => "TIMED_OUT",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "IN_PROGRESS" => Ok(BuildStatus::InProgress),
            "SUCCEEDED" => Ok(BuildStatus::Succeeded),
            "FAILED" => Ok(BuildStatus::Failed),
            "FAULT" => Ok(BuildStatus::Fault),
            "STOPPED" => Ok(BuildStatus::Stopped),
            "TIMED_OUT" => Ok(BuildStatus::TimedOut),
            other => Err(CloudError::ApiError(format!("Unknown build status: {}", other))),
        }
    }

    pub fn is_terminal_failure(&self) -> bool {
        !matches!(self, BuildStatus::InProgress | BuildStatus::Succeeded)
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Function readiness state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionState {
    Pending,
    Active,
    Failed,
}

impl fmt::Display for FunctionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionState::Pending => write!(f, "Pending"),
            FunctionState::Active => write!(f, "Active"),
            FunctionState::Failed => write!(f, "Failed"),
        }
    }
}

/// Status of a registered resource as seen by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Active,
    Pending,
    Missing,
    Failed,
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceStatus::Active => write!(f, "active"),
            ResourceStatus::Pending => write!(f, "pending"),
            ResourceStatus::Missing => write!(f, "missing"),
            ResourceStatus::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_status_parse() {
        assert_eq!(BuildStatus::parse("IN_PROGRESS").unwrap(), BuildStatus::InProgress);
        assert_eq!(BuildStatus::parse("TIMED_OUT").unwrap(), BuildStatus::TimedOut);
        assert!(BuildStatus::parse("QUEUED").is_err());
    }

    #[test]
    fn test_build_status_terminal_failure() {
        assert!(!BuildStatus::InProgress.is_terminal_failure());
        assert!(!BuildStatus::Succeeded.is_terminal_failure());
        for status in [
            BuildStatus::Failed,
            BuildStatus::Fault,
            BuildStatus::Stopped,
            BuildStatus::TimedOut,
        ] {
            assert!(status.is_terminal_failure(), "{} should be terminal", status);
        }
    }

    #[test]
    fn test_auth_status() {
        let ok = AuthStatus::ok("123456789012");
        assert!(ok.authenticated);
        let failed = AuthStatus::failed("no credentials");
        assert!(!failed.authenticated);
        assert_eq!(failed.error.as_deref(), Some("no credentials"));
    }
}
