//! ECR image registry

use crate::cli::AwsCli;
use crate::error::{AwsError, Result};
use async_trait::async_trait;
use modelship_cloud::{
    CloudError, CloudResource, ProviderHandle, RegistryRef, ResourceKind, ResourceStatus,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Repository {
    repository_name: String,
    repository_uri: String,
}

#[derive(Debug, Deserialize)]
struct CreateRepositoryOutput {
    repository: Repository,
}

#[derive(Debug, Deserialize)]
struct DescribeRepositoriesOutput {
    repositories: Vec<Repository>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageId {
    #[serde(default)]
    image_tag: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListImagesOutput {
    #[serde(default)]
    image_ids: Vec<ImageId>,
}

/// Tag pushed by the generated buildspec
pub const IMAGE_TAG: &str = "latest";

pub struct Ecr {
    cli: AwsCli,
}

impl Ecr {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }

    pub async fn create_repository(&self, name: &str) -> Result<RegistryRef> {
        let output: CreateRepositoryOutput = self
            .cli
            .run_json(&[
                "ecr",
                "create-repository",
                "--repository-name",
                name,
                "--image-tag-mutability",
                "MUTABLE",
                "--image-scanning-configuration",
                "scanOnPush=true",
                "--encryption-configuration",
                "encryptionType=AES256",
            ])
            .await?;

        tracing::info!(repository = %output.repository.repository_name, "Created image registry");
        Ok(RegistryRef {
            repository_name: output.repository.repository_name,
            repository_uri: output.repository.repository_uri,
            region: self.cli.region().to_string(),
        })
    }

    /// `<repositoryUri>:<tag>` of the pushed image, preferring `latest`
    pub async fn image_uri(&self, registry: &RegistryRef) -> Result<String> {
        let output: ListImagesOutput = self
            .cli
            .for_region(Some(&registry.region))
            .run_json(&[
                "ecr",
                "list-images",
                "--repository-name",
                &registry.repository_name,
                "--filter",
                "tagStatus=TAGGED",
            ])
            .await?;

        let tags: Vec<String> = output
            .image_ids
            .into_iter()
            .filter_map(|id| id.image_tag)
            .collect();

        let tag = tags
            .iter()
            .find(|t| t.as_str() == IMAGE_TAG)
            .or_else(|| tags.first())
            .ok_or_else(|| {
                AwsError::NotFound(format!(
                    "no tagged image in repository {}",
                    registry.repository_name
                ))
            })?;

        Ok(format!("{}:{}", registry.repository_uri, tag))
    }
}

fn registry_ref(handle: &ProviderHandle) -> modelship_cloud::Result<&RegistryRef> {
    match handle {
        ProviderHandle::ImageRegistry(registry) => Ok(registry),
        other => Err(CloudError::Validation(format!(
            "ECR client cannot handle {} resources",
            other.kind()
        ))),
    }
}

#[async_trait]
impl CloudResource for Ecr {
    fn kind(&self) -> ResourceKind {
        ResourceKind::ImageRegistry
    }

    async fn describe(&self, handle: &ProviderHandle) -> modelship_cloud::Result<ResourceStatus> {
        let registry = registry_ref(handle)?;
        let output: DescribeRepositoriesOutput = self
            .cli
            .for_region(Some(&registry.region))
            .run_json(&[
                "ecr",
                "describe-repositories",
                "--repository-names",
                &registry.repository_name,
            ])
            .await?;

        if output.repositories.is_empty() {
            Ok(ResourceStatus::Missing)
        } else {
            Ok(ResourceStatus::Active)
        }
    }

    async fn destroy(&self, handle: &ProviderHandle) -> modelship_cloud::Result<()> {
        let registry = registry_ref(handle)?;
        self.cli
            .for_region(Some(&registry.region))
            .run(&[
                "ecr",
                "delete-repository",
                "--repository-name",
                &registry.repository_name,
                "--force",
            ])
            .await?;
        tracing::info!(repository = %registry.repository_name, "Deleted image registry");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_create_repository() {
        let json = r#"{
            "repository": {
                "repositoryArn": "arn:aws:ecr:us-east-1:123456789012:repository/demomodel-abcdef",
                "registryId": "123456789012",
                "repositoryName": "demomodel-abcdef",
                "repositoryUri": "123456789012.dkr.ecr.us-east-1.amazonaws.com/demomodel-abcdef"
            }
        }"#;
        let output: CreateRepositoryOutput = serde_json::from_str(json).unwrap();
        assert_eq!(output.repository.repository_name, "demomodel-abcdef");
    }

    #[test]
    fn test_parse_list_images_skips_untagged() {
        let json = r#"{"imageIds":[{"imageDigest":"sha256:1"},{"imageDigest":"sha256:2","imageTag":"latest"}]}"#;
        let output: ListImagesOutput = serde_json::from_str(json).unwrap();
        let tags: Vec<_> = output.image_ids.into_iter().filter_map(|i| i.image_tag).collect();
        assert_eq!(tags, vec!["latest".to_string()]);
    }
}
