//! Lambda function running the inference image

use crate::cli::AwsCli;
use crate::error::{AwsError, Result};
use async_trait::async_trait;
use modelship_cloud::{
    CloudError, CloudResource, FunctionRef, FunctionState, ProviderHandle, ResourceKind,
    ResourceStatus, RoleRef,
};
use serde::Deserialize;
use std::time::Duration;

const TIMEOUT_SECS: &str = "360";
const MEMORY_MB: &str = "512";

/// add-permission is rejected while a function update is still settling
const PERMISSION_ATTEMPTS: u32 = 5;
const PERMISSION_RETRY_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Deserialize)]
pub struct FunctionConfiguration {
    #[serde(rename = "FunctionName")]
    pub function_name: String,
    #[serde(rename = "FunctionArn")]
    pub function_arn: String,
    #[serde(rename = "State", default)]
    pub state: Option<String>,
    #[serde(rename = "LastUpdateStatus", default)]
    pub last_update_status: Option<String>,
}

impl FunctionConfiguration {
    /// Readiness, taking in-flight code updates into account
    pub fn readiness(&self) -> FunctionState {
        match (self.state.as_deref(), self.last_update_status.as_deref()) {
            (Some("Failed"), _) | (_, Some("Failed")) => FunctionState::Failed,
            (Some("Active"), Some("InProgress")) => FunctionState::Pending,
            (Some("Active"), _) => FunctionState::Active,
            _ => FunctionState::Pending,
        }
    }
}

/// Account id embedded in a function ARN (`arn:aws:lambda:<region>:<account>:function:<name>`)
pub fn account_id(function_arn: &str) -> Option<&str> {
    function_arn.split(':').nth(4).filter(|id| !id.is_empty())
}

pub struct Lambda {
    cli: AwsCli,
}

impl Lambda {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }

    pub async fn create_function(
        &self,
        name: &str,
        role: &RoleRef,
        image_uri: &str,
    ) -> Result<FunctionRef> {
        let code = format!("ImageUri={}", image_uri);
        let config: FunctionConfiguration = self
            .cli
            .run_json(&[
                "lambda",
                "create-function",
                "--function-name",
                name,
                "--role",
                &role.role_arn,
                "--package-type",
                "Image",
                "--code",
                &code,
                "--timeout",
                TIMEOUT_SECS,
                "--memory-size",
                MEMORY_MB,
                "--description",
                "modelship inference service",
                "--publish",
            ])
            .await?;

        tracing::info!(function = %config.function_name, "Created function");
        Ok(FunctionRef {
            function_name: config.function_name,
            function_arn: config.function_arn,
            region: self.cli.region().to_string(),
        })
    }

    pub async fn update_image(&self, function: &FunctionRef, image_uri: &str) -> Result<()> {
        self.cli
            .for_region(Some(&function.region))
            .run(&[
                "lambda",
                "update-function-code",
                "--function-name",
                &function.function_name,
                "--image-uri",
                image_uri,
                "--publish",
            ])
            .await?;
        tracing::info!(function = %function.function_name, image = image_uri, "Updated function image");
        Ok(())
    }

    pub async fn configuration(&self, name: &str) -> Result<FunctionConfiguration> {
        self.cli
            .run_json(&["lambda", "get-function-configuration", "--function-name", name])
            .await
    }

    /// Allow `principal` to invoke the function from `source_arn`.
    ///
    /// An existing statement with the same id counts as granted.
    pub async fn add_permission(
        &self,
        function: &FunctionRef,
        statement_id: &str,
        principal: &str,
        source_arn: &str,
    ) -> Result<()> {
        let cli = self.cli.for_region(Some(&function.region));
        let args = [
            "lambda",
            "add-permission",
            "--function-name",
            function.function_name.as_str(),
            "--statement-id",
            statement_id,
            "--action",
            "lambda:InvokeFunction",
            "--principal",
            principal,
            "--source-arn",
            source_arn,
        ];

        let mut attempt = 1;
        loop {
            match cli.run(&args).await {
                Ok(_) => return Ok(()),
                Err(AwsError::AlreadyExists(_)) => {
                    tracing::debug!(statement_id, "Permission already present");
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < PERMISSION_ATTEMPTS => {
                    tracing::debug!(
                        statement_id,
                        attempt,
                        "Function update in progress, retrying add-permission"
                    );
                    attempt += 1;
                    tokio::time::sleep(PERMISSION_RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn function_ref(handle: &ProviderHandle) -> modelship_cloud::Result<&FunctionRef> {
    match handle {
        ProviderHandle::Function(function) => Ok(function),
        other => Err(CloudError::Validation(format!(
            "Lambda client cannot handle {} resources",
            other.kind()
        ))),
    }
}

#[async_trait]
impl CloudResource for Lambda {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Function
    }

    async fn describe(&self, handle: &ProviderHandle) -> modelship_cloud::Result<ResourceStatus> {
        let function = function_ref(handle)?;
        let config: FunctionConfiguration = self
            .cli
            .for_region(Some(&function.region))
            .run_json(&[
                "lambda",
                "get-function-configuration",
                "--function-name",
                &function.function_name,
            ])
            .await?;

        Ok(match config.readiness() {
            FunctionState::Active => ResourceStatus::Active,
            FunctionState::Pending => ResourceStatus::Pending,
            FunctionState::Failed => ResourceStatus::Failed,
        })
    }

    async fn destroy(&self, handle: &ProviderHandle) -> modelship_cloud::Result<()> {
        let function = function_ref(handle)?;
        self.cli
            .for_region(Some(&function.region))
            .run(&[
                "lambda",
                "delete-function",
                "--function-name",
                &function.function_name,
            ])
            .await?;
        tracing::info!(function = %function.function_name, "Deleted function");
        Ok(())
    }
}
