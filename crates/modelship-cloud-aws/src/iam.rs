//! IAM execution role

use crate::cli::AwsCli;
use crate::error::{AwsError, Result};
use crate::policy;
use async_trait::async_trait;
use modelship_cloud::{CloudError, CloudResource, ProviderHandle, ResourceKind, ResourceStatus, RoleRef};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RoleEnvelope {
    #[serde(rename = "Role")]
    role: RoleInfo,
}

#[derive(Debug, Deserialize)]
struct RoleInfo {
    #[serde(rename = "RoleName")]
    role_name: String,
    #[serde(rename = "Arn")]
    arn: String,
}

pub struct Iam {
    cli: AwsCli,
}

impl Iam {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }

    /// Create the role and attach the inline execution policy.
    ///
    /// If the policy cannot be attached the role is deleted again.
    pub async fn create_role(&self, name: &str) -> Result<RoleRef> {
        let trust = policy::assume_role_policy().to_string();
        let created: RoleEnvelope = self
            .cli
            .run_json(&[
                "iam",
                "create-role",
                "--role-name",
                name,
                "--assume-role-policy-document",
                &trust,
                "--description",
                "modelship build and runtime role",
            ])
            .await?;

        let policy_name = policy::inline_policy_name(name);
        let document = policy::execution_policy().to_string();
        if let Err(e) = self
            .cli
            .run(&[
                "iam",
                "put-role-policy",
                "--role-name",
                name,
                "--policy-name",
                &policy_name,
                "--policy-document",
                &document,
            ])
            .await
        {
            tracing::warn!(role = name, "Attaching policy failed, removing role");
            self.cli
                .cleanup(&["iam", "delete-role", "--role-name", name])
                .await;
            return Err(e);
        }

        tracing::info!(role = %created.role.role_name, "Created execution role");
        Ok(RoleRef {
            role_name: created.role.role_name,
            role_arn: created.role.arn,
        })
    }

    pub async fn delete_role(&self, name: &str) -> Result<()> {
        let policy_name = policy::inline_policy_name(name);
        match self
            .cli
            .run(&[
                "iam",
                "delete-role-policy",
                "--role-name",
                name,
                "--policy-name",
                &policy_name,
            ])
            .await
        {
            Ok(_) | Err(AwsError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        self.cli
            .run(&["iam", "delete-role", "--role-name", name])
            .await?;
        Ok(())
    }
}

fn role_ref(handle: &ProviderHandle) -> modelship_cloud::Result<&RoleRef> {
    match handle {
        ProviderHandle::Role(role) => Ok(role),
        other => Err(CloudError::Validation(format!(
            "IAM client cannot handle {} resources",
            other.kind()
        ))),
    }
}

#[async_trait]
impl CloudResource for Iam {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Role
    }

    async fn describe(&self, handle: &ProviderHandle) -> modelship_cloud::Result<ResourceStatus> {
        let role = role_ref(handle)?;
        let _: RoleEnvelope = self
            .cli
            .run_json(&["iam", "get-role", "--role-name", &role.role_name])
            .await?;
        Ok(ResourceStatus::Active)
    }

    async fn destroy(&self, handle: &ProviderHandle) -> modelship_cloud::Result<()> {
        let role = role_ref(handle)?;
        self.delete_role(&role.role_name).await?;
        tracing::info!(role = %role.role_name, "Deleted execution role");
        Ok(())
    }
}
