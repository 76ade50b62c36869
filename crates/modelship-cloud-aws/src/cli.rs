//! aws CLI wrapper
//!
//! Every AWS call goes through `aws --output json`, the same way the
//! credentials, profile and region of the operator's shell are picked up.

use crate::error::{AwsError, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const NOT_FOUND_CODES: &[&str] = &[
    "NoSuchEntity",
    "NoSuchBucket",
    "ResourceNotFoundException",
    "RepositoryNotFoundException",
    "NotFoundException",
    "404",
];

const AUTH_CODES: &[&str] = &[
    "ExpiredToken",
    "ExpiredTokenException",
    "InvalidClientTokenId",
    "UnrecognizedClientException",
    "SignatureDoesNotMatch",
];

const CONFLICT_CODES: &[&str] = &[
    "EntityAlreadyExists",
    "RepositoryAlreadyExistsException",
    "BucketAlreadyExists",
    "BucketAlreadyOwnedByYou",
    "ResourceAlreadyExistsException",
];

/// Lambda reuses this code for duplicates and for in-flight updates
const RESOURCE_CONFLICT: &str = "ResourceConflictException";

/// Failures reported by the CLI itself, before any service call
const CLI_AUTH_MESSAGES: &[&str] = &["Unable to locate credentials", "The config profile"];

/// Service error code and message from
/// `An error occurred (<code>) when calling the <op> operation: <message>`
pub fn service_error(stderr: &str) -> Option<(&str, &str)> {
    let rest = stderr.split_once("An error occurred (")?.1;
    let (code, rest) = rest.split_once(')')?;
    let message = rest
        .split_once("operation: ")
        .map(|(_, m)| m)
        .unwrap_or_default()
        .trim();
    Some((code, message))
}

/// Map aws CLI stderr to an error variant
pub fn classify_failure(stderr: &str) -> AwsError {
    let text = stderr.trim().to_string();
    let Some((code, message)) = service_error(stderr) else {
        if CLI_AUTH_MESSAGES.iter().any(|m| stderr.contains(m)) {
            return AwsError::AuthenticationFailed(text);
        }
        return AwsError::CommandFailed(text);
    };

    if AUTH_CODES.contains(&code) {
        AwsError::AuthenticationFailed(text)
    } else if NOT_FOUND_CODES.contains(&code) {
        AwsError::NotFound(text)
    } else if CONFLICT_CODES.contains(&code) {
        AwsError::AlreadyExists(text)
    } else if code == RESOURCE_CONFLICT {
        if message.contains("already exists") {
            AwsError::AlreadyExists(text)
        } else {
            AwsError::UpdateInProgress(text)
        }
    } else {
        AwsError::CommandFailed(text)
    }
}

/// Log the outcome of a rollback command. Returns whether the resource is gone.
pub fn report_cleanup(args: &[&str], result: Result<String>) -> bool {
    let command = args.iter().take(2).copied().collect::<Vec<_>>().join(" ");
    match result {
        Ok(_) => {
            tracing::debug!(command = %command, "Rolled back");
            true
        }
        Err(AwsError::NotFound(_)) => {
            tracing::debug!(command = %command, "Rollback target already gone");
            true
        }
        Err(e) => {
            tracing::warn!(command = %command, "Rollback failed, resource may be left behind: {}", e);
            false
        }
    }
}

/// aws CLI wrapper bound to a profile and region
#[derive(Debug, Clone)]
pub struct AwsCli {
    profile: Option<String>,
    region: String,
}

impl AwsCli {
    pub fn new(profile: Option<String>, region: impl Into<String>) -> Self {
        Self {
            profile,
            region: region.into(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Same profile, different region (for handles created elsewhere)
    pub fn for_region(&self, region: Option<&str>) -> Self {
        match region {
            Some(region) if region != self.region => Self::new(self.profile.clone(), region),
            _ => self.clone(),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("aws");
        if let Some(ref profile) = self.profile {
            cmd.arg("--profile").arg(profile);
        }
        cmd.arg("--region").arg(&self.region);
        cmd.arg("--output").arg("json");
        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: aws --region {} {}", self.region, args.join(" "));
        cmd
    }

    /// Check that the aws binary is on PATH
    pub async fn is_installed(&self) -> Result<bool> {
        let which = Command::new("which").arg("aws").output().await?;
        Ok(which.status.success())
    }

    /// Run an aws command and return stdout
    pub async fn run(&self, args: &[&str]) -> Result<String> {
        let output = self.command(args).output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run an aws command and parse its JSON output
    pub async fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T> {
        let output = self.run(args).await?;
        if output.trim().is_empty() {
            return Err(AwsError::UnexpectedOutput(format!(
                "empty output from `aws {}`",
                args.first().copied().unwrap_or_default()
            )));
        }
        Ok(serde_json::from_str(&output)?)
    }

    /// Run an aws command feeding `input` on stdin
    pub async fn run_with_input(&self, args: &[&str], input: &[u8]) -> Result<String> {
        let mut cmd = self.command(args);
        cmd.stdin(Stdio::piped());

        let mut child = cmd.spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Best-effort rollback command; failures are logged and not returned
    pub async fn cleanup(&self, args: &[&str]) -> bool {
        report_cleanup(args, self.run(args).await)
    }

    /// `sts get-caller-identity`
    pub async fn caller_identity(&self) -> Result<CallerIdentity> {
        self.run_json(&["sts", "get-caller-identity"]).await
    }
}

/// Output of `aws sts get-caller-identity`
#[derive(Debug, Clone, Deserialize)]
pub struct CallerIdentity {
    #[serde(rename = "Account")]
    pub account: String,
    #[serde(rename = "Arn")]
    pub arn: String,
    #[serde(rename = "UserId")]
    pub user_id: String,
}
