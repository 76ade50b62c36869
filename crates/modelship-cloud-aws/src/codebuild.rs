//! CodeBuild image build project

use crate::cli::AwsCli;
use crate::ecr::IMAGE_TAG;
use crate::error::{AwsError, Result};
use async_trait::async_trait;
use modelship_cloud::{
    BuildProjectRef, BuildStatus, CloudError, CloudResource, ProviderHandle, RegistryRef,
    ResourceKind, ResourceStatus, RoleRef,
};
use serde::Deserialize;
use serde_json::{Value, json};

pub const BUILD_IMAGE: &str = "aws/codebuild/amazonlinux2-x86_64-standard:5.0";
pub const COMPUTE_TYPE: &str = "BUILD_GENERAL1_MEDIUM";
const TIMEOUT_MINUTES: u32 = 60;

#[derive(Debug, Deserialize)]
struct StartBuildOutput {
    build: BuildInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildInfo {
    id: String,
    #[serde(default)]
    build_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BatchGetBuildsOutput {
    #[serde(default)]
    builds: Vec<BuildInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchGetProjectsOutput {
    #[serde(default)]
    projects: Vec<Value>,
}

/// Request body for `codebuild create-project --cli-input-json`
pub fn project_definition(
    name: &str,
    role: &RoleRef,
    source_location: &str,
    registry: &RegistryRef,
) -> Value {
    json!({
        "name": name,
        "description": "modelship inference image build",
        "source": {
            "type": "S3",
            "location": source_location,
            "buildspec": "buildspec.yml"
        },
        "artifacts": { "type": "NO_ARTIFACTS" },
        "environment": {
            "type": "LINUX_CONTAINER",
            "image": BUILD_IMAGE,
            "computeType": COMPUTE_TYPE,
            "privilegedMode": true,
            "environmentVariables": [
                { "name": "REPOSITORY_URI", "value": registry.repository_uri, "type": "PLAINTEXT" },
                { "name": "IMAGE_TAG", "value": IMAGE_TAG, "type": "PLAINTEXT" }
            ]
        },
        "serviceRole": role.role_arn,
        "timeoutInMinutes": TIMEOUT_MINUTES,
        "concurrentBuildLimit": 1,
        "logsConfig": {
            "cloudWatchLogs": { "status": "ENABLED" }
        }
    })
}

pub struct CodeBuild {
    cli: AwsCli,
}

impl CodeBuild {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }

    pub async fn create_project(
        &self,
        name: &str,
        role: &RoleRef,
        source_location: &str,
        registry: &RegistryRef,
    ) -> Result<BuildProjectRef> {
        let input = project_definition(name, role, source_location, registry).to_string();
        self.cli
            .run(&["codebuild", "create-project", "--cli-input-json", &input])
            .await?;

        tracing::info!(project = name, source = source_location, "Created build project");
        Ok(BuildProjectRef {
            project_name: name.to_string(),
            region: self.cli.region().to_string(),
        })
    }

    pub async fn start_build(&self, project: &BuildProjectRef) -> Result<String> {
        let output: StartBuildOutput = self
            .cli
            .for_region(Some(&project.region))
            .run_json(&["codebuild", "start-build", "--project-name", &project.project_name])
            .await?;
        tracing::info!(build_id = %output.build.id, "Started build");
        Ok(output.build.id)
    }

    pub async fn build_status(&self, build_id: &str) -> Result<BuildStatus> {
        let output: BatchGetBuildsOutput = self
            .cli
            .run_json(&["codebuild", "batch-get-builds", "--ids", build_id])
            .await?;

        let build = output
            .builds
            .into_iter()
            .find(|b| b.id == build_id)
            .ok_or_else(|| AwsError::NotFound(format!("build {}", build_id)))?;

        let status = build
            .build_status
            .ok_or_else(|| AwsError::UnexpectedOutput(format!("build {} has no status", build_id)))?;

        BuildStatus::parse(&status).map_err(|e| AwsError::UnexpectedOutput(e.to_string()))
    }
}

fn project_ref(handle: &ProviderHandle) -> modelship_cloud::Result<&BuildProjectRef> {
    match handle {
        ProviderHandle::BuildProject(project) => Ok(project),
        other => Err(CloudError::Validation(format!(
            "CodeBuild client cannot handle {} resources",
            other.kind()
        ))),
    }
}

#[async_trait]
impl CloudResource for CodeBuild {
    fn kind(&self) -> ResourceKind {
        ResourceKind::BuildProject
    }

    async fn describe(&self, handle: &ProviderHandle) -> modelship_cloud::Result<ResourceStatus> {
        let project = project_ref(handle)?;
        let output: BatchGetProjectsOutput = self
            .cli
            .for_region(Some(&project.region))
            .run_json(&["codebuild", "batch-get-projects", "--names", &project.project_name])
            .await?;

        if output.projects.is_empty() {
            Ok(ResourceStatus::Missing)
        } else {
            Ok(ResourceStatus::Active)
        }
    }

    async fn destroy(&self, handle: &ProviderHandle) -> modelship_cloud::Result<()> {
        let project = project_ref(handle)?;
        let cli = self.cli.for_region(Some(&project.region));

        // delete-project succeeds for unknown names, so check first
        if self.describe(handle).await? == ResourceStatus::Missing {
            return Err(CloudError::ResourceNotFound(format!(
                "build project {}",
                project.project_name
            )));
        }

        cli.run(&["codebuild", "delete-project", "--name", &project.project_name])
            .await?;
        tracing::info!(project = %project.project_name, "Deleted build project");
        Ok(())
    }
}
