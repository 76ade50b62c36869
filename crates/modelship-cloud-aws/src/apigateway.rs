//! API Gateway REST API in front of the function

use crate::cli::AwsCli;
use crate::error::{AwsError, Result};
use async_trait::async_trait;
use modelship_cloud::{
    ApiRef, CloudError, CloudResource, ProviderHandle, ResourceKind, ResourceStatus,
};
use serde::Deserialize;
use serde_json::json;

const PROXY_PATH: &str = "{proxy+}";

#[derive(Debug, Deserialize)]
struct RestApi {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiResource {
    id: String,
    #[serde(default)]
    path: String,
}

#[derive(Debug, Deserialize)]
struct GetResourcesOutput {
    #[serde(default)]
    items: Vec<ApiResource>,
}

/// Lambda proxy integration URI
pub fn integration_uri(region: &str, function_arn: &str) -> String {
    format!(
        "arn:aws:apigateway:{}:lambda:path/2015-03-31/functions/{}/invocations",
        region, function_arn
    )
}

/// Source ARNs covering the root resource and every proxied path
pub fn invoke_source_arns(region: &str, account: &str, api_id: &str) -> [String; 2] {
    let base = format!("arn:aws:execute-api:{}:{}:{}", region, account, api_id);
    [format!("{}/*/*/", base), format!("{}/*/*/*", base)]
}

/// Public URL of a deployed stage
pub fn stage_url(api_id: &str, region: &str, stage: &str) -> String {
    format!("https://{}.execute-api.{}.amazonaws.com/{}", api_id, region, stage)
}

pub struct ApiGateway {
    cli: AwsCli,
}

impl ApiGateway {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }

    /// Create a regional REST API proxying `/` and `/{proxy+}` to the integration.
    ///
    /// The API is deleted again if wiring the routes fails.
    pub async fn create_api(
        &self,
        name: &str,
        description: &str,
        integration_uri: &str,
    ) -> Result<ApiRef> {
        let input = json!({
            "name": name,
            "description": description,
            "apiKeySource": "HEADER",
            "endpointConfiguration": { "types": ["REGIONAL"] }
        })
        .to_string();

        let api: RestApi = self
            .cli
            .run_json(&["apigateway", "create-rest-api", "--cli-input-json", &input])
            .await?;

        if let Err(e) = self.wire_routes(&api.id, integration_uri).await {
            tracing::warn!(rest_api_id = %api.id, "Route setup failed, removing API");
            self.cli
                .cleanup(&["apigateway", "delete-rest-api", "--rest-api-id", &api.id])
                .await;
            return Err(e);
        }

        tracing::info!(rest_api_id = %api.id, name = %api.name, "Created REST API");
        Ok(ApiRef {
            rest_api_id: api.id,
            api_name: api.name,
            stage: None,
            region: self.cli.region().to_string(),
        })
    }

    async fn wire_routes(&self, api_id: &str, integration_uri: &str) -> Result<()> {
        let resources: GetResourcesOutput = self
            .cli
            .run_json(&["apigateway", "get-resources", "--rest-api-id", api_id])
            .await?;

        let root = resources
            .items
            .iter()
            .find(|r| r.path == "/")
            .ok_or_else(|| AwsError::UnexpectedOutput(format!("API {} has no root resource", api_id)))?;

        self.proxy_method(api_id, &root.id, integration_uri).await?;

        let proxy: ApiResource = self
            .cli
            .run_json(&[
                "apigateway",
                "create-resource",
                "--rest-api-id",
                api_id,
                "--parent-id",
                &root.id,
                "--path-part",
                PROXY_PATH,
            ])
            .await?;

        self.proxy_method(api_id, &proxy.id, integration_uri).await
    }

    async fn proxy_method(&self, api_id: &str, resource_id: &str, integration_uri: &str) -> Result<()> {
        self.cli
            .run(&[
                "apigateway",
                "put-method",
                "--rest-api-id",
                api_id,
                "--resource-id",
                resource_id,
                "--http-method",
                "ANY",
                "--authorization-type",
                "NONE",
            ])
            .await?;

        self.cli
            .run(&[
                "apigateway",
                "put-integration",
                "--rest-api-id",
                api_id,
                "--resource-id",
                resource_id,
                "--http-method",
                "ANY",
                "--type",
                "AWS_PROXY",
                "--integration-http-method",
                "POST",
                "--uri",
                integration_uri,
            ])
            .await?;
        Ok(())
    }

    /// Deploy to `stage` and return its URL
    pub async fn create_deployment(&self, api: &ApiRef, stage: &str) -> Result<String> {
        self.cli
            .for_region(Some(&api.region))
            .run(&[
                "apigateway",
                "create-deployment",
                "--rest-api-id",
                &api.rest_api_id,
                "--stage-name",
                stage,
                "--description",
                "modelship deployment",
            ])
            .await?;

        let url = stage_url(&api.rest_api_id, &api.region, stage);
        tracing::info!(url = %url, "Deployed API stage");
        Ok(url)
    }
}

fn api_ref(handle: &ProviderHandle) -> modelship_cloud::Result<&ApiRef> {
    match handle {
        ProviderHandle::RestApi(api) => Ok(api),
        other => Err(CloudError::Validation(format!(
            "API Gateway client cannot handle {} resources",
            other.kind()
        ))),
    }
}

#[async_trait]
impl CloudResource for ApiGateway {
    fn kind(&self) -> ResourceKind {
        ResourceKind::RestApi
    }

    async fn describe(&self, handle: &ProviderHandle) -> modelship_cloud::Result<ResourceStatus> {
        let api = api_ref(handle)?;
        let _: RestApi = self
            .cli
            .for_region(Some(&api.region))
            .run_json(&["apigateway", "get-rest-api", "--rest-api-id", &api.rest_api_id])
            .await?;
        Ok(ResourceStatus::Active)
    }

    /// Deleting the REST API removes its stages and deployments with it
    async fn destroy(&self, handle: &ProviderHandle) -> modelship_cloud::Result<()> {
        let api = api_ref(handle)?;
        self.cli
            .for_region(Some(&api.region))
            .run(&["apigateway", "delete-rest-api", "--rest-api-id", &api.rest_api_id])
            .await?;
        tracing::info!(rest_api_id = %api.rest_api_id, "Deleted REST API");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integration_uri() {
        assert_eq!(
            integration_uri("us-east-1", "arn:aws:lambda:us-east-1:123456789012:function:demo"),
            "arn:aws:apigateway:us-east-1:lambda:path/2015-03-31/functions/arn:aws:lambda:us-east-1:123456789012:function:demo/invocations"
        );
    }

    #[test]
    fn test_invoke_source_arns() {
        let [root, proxy] = invoke_source_arns("eu-west-1", "123456789012", "a1b2c3");
        assert_eq!(root, "arn:aws:execute-api:eu-west-1:123456789012:a1b2c3/*/*/");
        assert_eq!(proxy, "arn:aws:execute-api:eu-west-1:123456789012:a1b2c3/*/*/*");
    }

    #[test]
    fn test_stage_url() {
        assert_eq!(
            stage_url("a1b2c3", "us-east-1", "dev"),
            "https://a1b2c3.execute-api.us-east-1.amazonaws.com/dev"
        );
    }

    #[test]
    fn test_parse_resources() {
        let json = r#"{"items":[{"id":"r00t","path":"/"}]}"#;
        let output: GetResourcesOutput = serde_json::from_str(json).unwrap();
        assert_eq!(output.items[0].id, "r00t");
    }
}
