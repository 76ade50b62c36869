//! AWS provider implementation

use crate::apigateway::{self, ApiGateway};
use crate::cli::AwsCli;
use crate::codebuild::CodeBuild;
use crate::ecr::Ecr;
use crate::error::AwsError;
use crate::events::Events;
use crate::iam::Iam;
use crate::lambda::{self, Lambda};
use crate::s3::S3;
use async_trait::async_trait;
use modelship_cloud::{
    ApiRef, AuthStatus, BuildProjectRef, BuildStatus, CloudError, CloudProvider, CloudResource,
    FunctionRef, FunctionState, ProviderHandle, RegistryRef, ResourceKind, ResourceStatus, Result,
    RoleRef, ScheduleRef, StoreRef,
};

/// AWS provider composed of one client per service
pub struct AwsProvider {
    cli: AwsCli,
    iam: Iam,
    ecr: Ecr,
    s3: S3,
    codebuild: CodeBuild,
    lambda: Lambda,
    apigateway: ApiGateway,
    events: Events,
}

impl AwsProvider {
    pub fn new(profile: Option<String>, region: impl Into<String>) -> Self {
        let cli = AwsCli::new(profile, region);
        Self {
            iam: Iam::new(cli.clone()),
            ecr: Ecr::new(cli.clone()),
            s3: S3::new(cli.clone()),
            codebuild: CodeBuild::new(cli.clone()),
            lambda: Lambda::new(cli.clone()),
            apigateway: ApiGateway::new(cli.clone()),
            events: Events::new(cli.clone()),
            cli,
        }
    }

    /// Client responsible for resources of `kind`
    pub fn resource_client(&self, kind: ResourceKind) -> &dyn CloudResource {
        match kind {
            ResourceKind::Role => &self.iam,
            ResourceKind::ImageRegistry => &self.ecr,
            ResourceKind::ObjectStore => &self.s3,
            ResourceKind::BuildProject => &self.codebuild,
            ResourceKind::Function => &self.lambda,
            ResourceKind::RestApi => &self.apigateway,
            ResourceKind::ScheduleRule => &self.events,
        }
    }
}

#[async_trait]
impl CloudProvider for AwsProvider {
    fn name(&self) -> &str {
        "aws"
    }

    fn display_name(&self) -> &str {
        "Amazon Web Services"
    }

    fn region(&self) -> &str {
        self.cli.region()
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        if !self.cli.is_installed().await.map_err(CloudError::from)? {
            return Ok(AuthStatus::failed(AwsError::AwsCliNotFound.to_string()));
        }

        match self.cli.caller_identity().await {
            Ok(identity) => Ok(AuthStatus::ok(format!(
                "{} ({})",
                identity.account, identity.arn
            ))),
            Err(AwsError::AuthenticationFailed(msg)) => Ok(AuthStatus::failed(msg)),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_execution_role(&self, name: &str) -> Result<RoleRef> {
        Ok(self.iam.create_role(name).await?)
    }

    async fn create_image_registry(&self, name: &str) -> Result<RegistryRef> {
        Ok(self.ecr.create_repository(name).await?)
    }

    async fn create_object_store(&self, name: &str) -> Result<StoreRef> {
        Ok(self.s3.create_bucket(name).await?)
    }

    async fn upload_object(&self, store: &StoreRef, key: &str, body: &[u8]) -> Result<()> {
        Ok(self.s3.put_object(store, key, body).await?)
    }

    async fn create_build_project(
        &self,
        name: &str,
        role: &RoleRef,
        source_location: &str,
        registry: &RegistryRef,
    ) -> Result<BuildProjectRef> {
        Ok(self
            .codebuild
            .create_project(name, role, source_location, registry)
            .await?)
    }

    async fn start_build(&self, project: &BuildProjectRef) -> Result<String> {
        Ok(self.codebuild.start_build(project).await?)
    }

    async fn poll_build_status(&self, build_id: &str) -> Result<BuildStatus> {
        Ok(self.codebuild.build_status(build_id).await?)
    }

    async fn get_image_uri(&self, registry: &RegistryRef) -> Result<String> {
        Ok(self.ecr.image_uri(registry).await?)
    }

    async fn create_function(
        &self,
        name: &str,
        role: &RoleRef,
        image_uri: &str,
    ) -> Result<FunctionRef> {
        Ok(self.lambda.create_function(name, role, image_uri).await?)
    }

    async fn update_function_image(&self, function: &FunctionRef, image_uri: &str) -> Result<()> {
        Ok(self.lambda.update_image(function, image_uri).await?)
    }

    async fn poll_function_state(&self, function_name: &str) -> Result<FunctionState> {
        let config = self.lambda.configuration(function_name).await?;
        Ok(config.readiness())
    }

    fn function_integration_uri(&self, function: &FunctionRef) -> String {
        apigateway::integration_uri(&function.region, &function.function_arn)
    }

    async fn create_api(
        &self,
        name: &str,
        description: &str,
        integration_uri: &str,
    ) -> Result<ApiRef> {
        Ok(self
            .apigateway
            .create_api(name, description, integration_uri)
            .await?)
    }

    async fn grant_invoke_permission(&self, api: &ApiRef, function: &FunctionRef) -> Result<()> {
        let account = lambda::account_id(&function.function_arn).ok_or_else(|| {
            CloudError::Validation(format!(
                "Cannot read account id from {}",
                function.function_arn
            ))
        })?;

        let [root_arn, proxy_arn] =
            apigateway::invoke_source_arns(&api.region, account, &api.rest_api_id);

        for (suffix, source_arn) in [("root", root_arn), ("proxy", proxy_arn)] {
            let statement_id = format!("{}-{}", api.rest_api_id, suffix);
            self.lambda
                .add_permission(function, &statement_id, "apigateway.amazonaws.com", &source_arn)
                .await?;
        }

        tracing::info!(
            rest_api_id = %api.rest_api_id,
            function = %function.function_name,
            "Granted invoke permission"
        );
        Ok(())
    }

    async fn create_deployment_stage(&self, api: &ApiRef, stage: &str) -> Result<String> {
        Ok(self.apigateway.create_deployment(api, stage).await?)
    }

    async fn create_schedule_rule(
        &self,
        name: &str,
        target: &FunctionRef,
        schedule_expression: &str,
    ) -> Result<ScheduleRef> {
        Ok(self
            .events
            .create_rule(&self.lambda, name, target, schedule_expression)
            .await?)
    }

    async fn describe(&self, handle: &ProviderHandle) -> Result<ResourceStatus> {
        self.resource_client(handle.kind()).describe(handle).await
    }

    async fn destroy(&self, handle: &ProviderHandle) -> Result<()> {
        self.resource_client(handle.kind()).destroy(handle).await
    }
}
