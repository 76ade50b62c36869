//! S3 object store

use crate::cli::AwsCli;
use crate::error::Result;
use async_trait::async_trait;
use modelship_cloud::{CloudError, CloudResource, ProviderHandle, ResourceKind, ResourceStatus, StoreRef};

/// Region where buckets must be created without a location constraint
const DEFAULT_REGION: &str = "us-east-1";

pub struct S3 {
    cli: AwsCli,
}

impl S3 {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }

    pub async fn create_bucket(&self, name: &str) -> Result<StoreRef> {
        let region = self.cli.region().to_string();
        let constraint = format!("LocationConstraint={}", region);

        let mut args = vec!["s3api", "create-bucket", "--bucket", name];
        if region != DEFAULT_REGION {
            args.push("--create-bucket-configuration");
            args.push(constraint.as_str());
        }

        self.cli.run(&args).await?;
        tracing::info!(bucket = name, region = %region, "Created bucket");

        Ok(StoreRef {
            bucket_name: name.to_string(),
            region,
        })
    }

    /// Upload `body` to `s3://<bucket>/<key>`
    pub async fn put_object(&self, store: &StoreRef, key: &str, body: &[u8]) -> Result<()> {
        let target = object_url(&store.bucket_name, key);
        self.cli
            .for_region(Some(&store.region))
            .run_with_input(&["s3", "cp", "-", &target], body)
            .await?;
        tracing::debug!(target = %target, bytes = body.len(), "Uploaded object");
        Ok(())
    }
}

pub fn object_url(bucket: &str, key: &str) -> String {
    format!("s3://{}/{}", bucket, key.trim_start_matches('/'))
}

fn store_ref(handle: &ProviderHandle) -> modelship_cloud::Result<&StoreRef> {
    match handle {
        ProviderHandle::ObjectStore(store) => Ok(store),
        other => Err(CloudError::Validation(format!(
            "S3 client cannot handle {} resources",
            other.kind()
        ))),
    }
}

#[async_trait]
impl CloudResource for S3 {
    fn kind(&self) -> ResourceKind {
        ResourceKind::ObjectStore
    }

    async fn describe(&self, handle: &ProviderHandle) -> modelship_cloud::Result<ResourceStatus> {
        let store = store_ref(handle)?;
        self.cli
            .for_region(Some(&store.region))
            .run(&["s3api", "head-bucket", "--bucket", &store.bucket_name])
            .await?;
        Ok(ResourceStatus::Active)
    }

    /// Empty the bucket, then delete it
    async fn destroy(&self, handle: &ProviderHandle) -> modelship_cloud::Result<()> {
        let store = store_ref(handle)?;
        let url = format!("s3://{}", store.bucket_name);
        self.cli
            .for_region(Some(&store.region))
            .run(&["s3", "rb", &url, "--force"])
            .await?;
        tracing::info!(bucket = %store.bucket_name, "Deleted bucket");
        Ok(())
    }
}
