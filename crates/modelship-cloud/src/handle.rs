//! Typed provider handles
//!
//! A handle holds only the identifying state of one provisioned resource
//! (names, ids, region). Live clients and credentials are never part of it;
//! they come back through [`Capability::rehydrate`] which binds a handle to
//! a provider built from ambient credentials.

use crate::error::{CloudError, Result};
use crate::provider::{CloudProvider, ResourceStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Resource kind tag stored next to every registered handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    #[serde(rename = "IAM")]
    Role,
    #[serde(rename = "ECR")]
    ImageRegistry,
    #[serde(rename = "S3")]
    ObjectStore,
    #[serde(rename = "CodeBuild")]
    BuildProject,
    #[serde(rename = "AWSLambda")]
    Function,
    #[serde(rename = "APIGateway")]
    RestApi,
    #[serde(rename = "Cloudwatch")]
    ScheduleRule,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::Role,
        ResourceKind::ImageRegistry,
        ResourceKind::ObjectStore,
        ResourceKind::BuildProject,
        ResourceKind::Function,
        ResourceKind::RestApi,
        ResourceKind::ScheduleRule,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Role => "IAM",
            ResourceKind::ImageRegistry => "ECR",
            ResourceKind::ObjectStore => "S3",
            ResourceKind::BuildProject => "CodeBuild",
            ResourceKind::Function => "AWSLambda",
            ResourceKind::RestApi => "APIGateway",
            ResourceKind::ScheduleRule => "Cloudwatch",
        }
    }

    /// Case-insensitive match against a kind tag (used by include/exclude selectors)
    pub fn matches(&self, tag: &str) -> bool {
        self.as_str().eq_ignore_ascii_case(tag)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.matches(s))
            .ok_or_else(|| CloudError::Validation(format!("Unsupported resource kind: {}", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRef {
    pub role_name: String,
    pub role_arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRef {
    pub repository_name: String,
    pub repository_uri: String,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRef {
    pub bucket_name: String,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildProjectRef {
    pub project_name: String,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRef {
    pub function_name: String,
    pub function_arn: String,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiRef {
    pub rest_api_id: String,
    pub api_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRef {
    pub rule_name: String,
    pub rule_arn: String,
    pub target_id: String,
    pub region: String,
}

/// Minimal identifying state of one provisioned resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ProviderHandle {
    #[serde(rename = "IAM")]
    Role(RoleRef),
    #[serde(rename = "ECR")]
    ImageRegistry(RegistryRef),
    #[serde(rename = "S3")]
    ObjectStore(StoreRef),
    #[serde(rename = "CodeBuild")]
    BuildProject(BuildProjectRef),
    #[serde(rename = "AWSLambda")]
    Function(FunctionRef),
    #[serde(rename = "APIGateway")]
    RestApi(ApiRef),
    #[serde(rename = "Cloudwatch")]
    ScheduleRule(ScheduleRef),
}

impl ProviderHandle {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ProviderHandle::Role(_) => ResourceKind::Role,
            ProviderHandle::ImageRegistry(_) => ResourceKind::ImageRegistry,
            ProviderHandle::ObjectStore(_) => ResourceKind::ObjectStore,
            ProviderHandle::BuildProject(_) => ResourceKind::BuildProject,
            ProviderHandle::Function(_) => ResourceKind::Function,
            ProviderHandle::RestApi(_) => ResourceKind::RestApi,
            ProviderHandle::ScheduleRule(_) => ResourceKind::ScheduleRule,
        }
    }

    /// Provider-side identifier (bucket name, function name, rest-api id, ...)
    pub fn identifier(&self) -> &str {
        match self {
            ProviderHandle::Role(r) => &r.role_name,
            ProviderHandle::ImageRegistry(r) => &r.repository_name,
            ProviderHandle::ObjectStore(r) => &r.bucket_name,
            ProviderHandle::BuildProject(r) => &r.project_name,
            ProviderHandle::Function(r) => &r.function_name,
            ProviderHandle::RestApi(r) => &r.rest_api_id,
            ProviderHandle::ScheduleRule(r) => &r.rule_name,
        }
    }

    /// Region the resource lives in. Roles are global.
    pub fn region(&self) -> Option<&str> {
        match self {
            ProviderHandle::Role(_) => None,
            ProviderHandle::ImageRegistry(r) => Some(&r.region),
            ProviderHandle::ObjectStore(r) => Some(&r.region),
            ProviderHandle::BuildProject(r) => Some(&r.region),
            ProviderHandle::Function(r) => Some(&r.region),
            ProviderHandle::RestApi(r) => Some(&r.region),
            ProviderHandle::ScheduleRule(r) => Some(&r.region),
        }
    }

    /// Check that every required identifying field is present
    pub fn validate(&self) -> Result<()> {
        let required: Vec<(&str, &str)> = match self {
            ProviderHandle::Role(r) => vec![
                ("role_name", r.role_name.as_str()),
                ("role_arn", r.role_arn.as_str()),
            ],
            ProviderHandle::ImageRegistry(r) => vec![
                ("repository_name", r.repository_name.as_str()),
                ("repository_uri", r.repository_uri.as_str()),
                ("region", r.region.as_str()),
            ],
            ProviderHandle::ObjectStore(r) => vec![
                ("bucket_name", r.bucket_name.as_str()),
                ("region", r.region.as_str()),
            ],
            ProviderHandle::BuildProject(r) => vec![
                ("project_name", r.project_name.as_str()),
                ("region", r.region.as_str()),
            ],
            ProviderHandle::Function(r) => vec![
                ("function_name", r.function_name.as_str()),
                ("function_arn", r.function_arn.as_str()),
                ("region", r.region.as_str()),
            ],
            ProviderHandle::RestApi(r) => vec![
                ("rest_api_id", r.rest_api_id.as_str()),
                ("api_name", r.api_name.as_str()),
                ("region", r.region.as_str()),
            ],
            ProviderHandle::ScheduleRule(r) => vec![
                ("rule_name", r.rule_name.as_str()),
                ("target_id", r.target_id.as_str()),
                ("region", r.region.as_str()),
            ],
        };

        match required.iter().find(|(_, value)| value.trim().is_empty()) {
            Some((field, _)) => Err(CloudError::MalformedHandle(format!(
                "{} handle is missing `{}`",
                self.kind(),
                field
            ))),
            None => Ok(()),
        }
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Deterministic serialized form
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a handle recorded under `kind`
    pub fn from_value(kind: ResourceKind, value: &serde_json::Value) -> Result<Self> {
        let handle: ProviderHandle = serde_json::from_value(value.clone())
            .map_err(|e| CloudError::MalformedHandle(format!("{} handle: {}", kind, e)))?;

        if handle.kind() != kind {
            return Err(CloudError::MalformedHandle(format!(
                "expected {} handle, found {}",
                kind,
                handle.kind()
            )));
        }

        handle.validate()?;
        Ok(handle)
    }

    pub fn from_bytes(kind: ResourceKind, bytes: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| CloudError::MalformedHandle(format!("{} handle: {}", kind, e)))?;
        Self::from_value(kind, &value)
    }
}

/// Outcome of an idempotent destroy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyOutcome {
    Destroyed,
    /// The provider no longer knows the resource
    AlreadyGone,
}

/// A handle bound to a live provider
pub struct Capability<'a> {
    handle: ProviderHandle,
    provider: &'a dyn CloudProvider,
}

impl<'a> Capability<'a> {
    /// Bind a handle to a provider whose credentials were already checked
    pub fn bind(handle: ProviderHandle, provider: &'a dyn CloudProvider) -> Self {
        Self { handle, provider }
    }

    /// Rebuild a capability from persisted state and ambient credentials
    pub async fn rehydrate(
        kind: ResourceKind,
        value: &serde_json::Value,
        provider: &'a dyn CloudProvider,
    ) -> Result<Self> {
        let handle = ProviderHandle::from_value(kind, value)?;

        let auth = provider.check_auth().await?;
        if !auth.authenticated {
            return Err(CloudError::AuthenticationFailed(
                auth.error
                    .unwrap_or_else(|| format!("{} credentials unavailable", provider.name())),
            ));
        }

        Ok(Self::bind(handle, provider))
    }

    pub fn handle(&self) -> &ProviderHandle {
        &self.handle
    }

    pub async fn describe(&self) -> Result<ResourceStatus> {
        match self.provider.describe(&self.handle).await {
            Err(e) if e.is_not_found() => Ok(ResourceStatus::Missing),
            other => other,
        }
    }

    /// Destroy the resource. A resource the provider no longer knows is not an error.
    pub async fn destroy(&self) -> Result<DestroyOutcome> {
        match self.provider.destroy(&self.handle).await {
            Ok(()) => Ok(DestroyOutcome::Destroyed),
            Err(e) if e.is_not_found() => {
                tracing::warn!(
                    kind = %self.handle.kind(),
                    id = %self.handle.identifier(),
                    "Resource already gone: {}",
                    e
                );
                Ok(DestroyOutcome::AlreadyGone)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket() -> ProviderHandle {
        ProviderHandle::ObjectStore(StoreRef {
            bucket_name: "demomodel-qwerty".into(),
            region: "us-east-1".into(),
        })
    }

    #[test]
    fn test_handle_serializes_identifying_fields_only() {
        let value = bucket().to_value().unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "kind": "S3",
                "bucket_name": "demomodel-qwerty",
                "region": "us-east-1"
            })
        );
    }

    #[test]
    fn test_handle_bytes_are_deterministic() {
        assert_eq!(bucket().to_bytes().unwrap(), bucket().to_bytes().unwrap());
        let parsed =
            ProviderHandle::from_bytes(ResourceKind::ObjectStore, &bucket().to_bytes().unwrap())
                .unwrap();
        assert_eq!(parsed, bucket());
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let value = serde_json::json!({ "kind": "AWSLambda", "function_name": "demo" });
        let err = ProviderHandle::from_value(ResourceKind::Function, &value).unwrap_err();
        assert!(matches!(err, CloudError::MalformedHandle(_)));
    }

    #[test]
    fn test_empty_field_is_malformed() {
        let value = serde_json::json!({ "kind": "S3", "bucket_name": " ", "region": "us-east-1" });
        let err = ProviderHandle::from_value(ResourceKind::ObjectStore, &value).unwrap_err();
        assert!(err.to_string().contains("bucket_name"));
    }

    #[test]
    fn test_kind_mismatch_is_malformed() {
        let value = bucket().to_value().unwrap();
        let err = ProviderHandle::from_value(ResourceKind::ImageRegistry, &value).unwrap_err();
        assert!(matches!(err, CloudError::MalformedHandle(_)));
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!("s3".parse::<ResourceKind>().unwrap(), ResourceKind::ObjectStore);
        assert_eq!("AWSLambda".parse::<ResourceKind>().unwrap(), ResourceKind::Function);
        assert!("Dynamo".parse::<ResourceKind>().is_err());
        assert_eq!(
            serde_json::to_string(&ResourceKind::ScheduleRule).unwrap(),
            "\"Cloudwatch\""
        );
    }

    #[test]
    fn test_optional_stage_omitted() {
        let api = ProviderHandle::RestApi(ApiRef {
            rest_api_id: "a1b2c3".into(),
            api_name: "DemoModel".into(),
            stage: None,
            region: "eu-west-1".into(),
        });
        let value = api.to_value().unwrap();
        assert!(value.get("stage").is_none());
        assert_eq!(api.region(), Some("eu-west-1"));
        assert_eq!(api.identifier(), "a1b2c3");
    }
}
