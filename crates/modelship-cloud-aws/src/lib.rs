//! modelship AWS provider
//!
//! Implements [`modelship_cloud::CloudProvider`] on top of the `aws` CLI.
//! The provider is a composition of small per-service clients, each of which
//! also implements [`modelship_cloud::CloudResource`] for its resource kind:
//!
//! - IAM: execution role with an inline policy
//! - ECR: image registry
//! - S3: artifact bucket
//! - CodeBuild: image build project
//! - Lambda: inference function
//! - API Gateway: REST API front door
//! - CloudWatch Events: keep-warm rule

pub mod apigateway;
pub mod cli;
pub mod codebuild;
pub mod ecr;
pub mod error;
pub mod events;
pub mod iam;
pub mod lambda;
pub mod policy;
pub mod provider;
pub mod s3;

pub use cli::AwsCli;
pub use error::{AwsError, Result};
pub use provider::AwsProvider;
