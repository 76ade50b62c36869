//! IAM policy documents for the execution role

use serde_json::{Value, json};

/// Services allowed to assume the execution role
pub const TRUSTED_SERVICES: &[&str] = &[
    "apigateway.amazonaws.com",
    "lambda.amazonaws.com",
    "events.amazonaws.com",
    "s3.amazonaws.com",
    "codebuild.amazonaws.com",
];

pub fn assume_role_policy() -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": TRUSTED_SERVICES },
            "Action": "sts:AssumeRole"
        }]
    })
}

/// Inline policy: build logs, image push/pull, artifact reads and function invocation
pub fn execution_policy() -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Action": [
                    "logs:CreateLogGroup",
                    "logs:CreateLogStream",
                    "logs:PutLogEvents"
                ],
                "Resource": "*"
            },
            {
                "Effect": "Allow",
                "Action": [
                    "ecr:GetAuthorizationToken",
                    "ecr:BatchCheckLayerAvailability",
                    "ecr:BatchGetImage",
                    "ecr:GetDownloadUrlForLayer",
                    "ecr:InitiateLayerUpload",
                    "ecr:UploadLayerPart",
                    "ecr:CompleteLayerUpload",
                    "ecr:PutImage"
                ],
                "Resource": "*"
            },
            {
                "Effect": "Allow",
                "Action": [
                    "s3:GetObject",
                    "s3:GetObjectVersion",
                    "s3:GetBucketLocation",
                    "s3:ListBucket",
                    "s3:PutObject"
                ],
                "Resource": "*"
            },
            {
                "Effect": "Allow",
                "Action": ["lambda:InvokeFunction"],
                "Resource": "*"
            }
        ]
    })
}

/// Name of the inline policy attached to `role_name`
pub fn inline_policy_name(role_name: &str) -> String {
    format!("{}-policy", role_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assume_role_trusts_pipeline_services() {
        let policy = assume_role_policy();
        let services = policy["Statement"][0]["Principal"]["Service"]
            .as_array()
            .unwrap();
        assert_eq!(services.len(), 5);
        assert!(services.iter().any(|s| s == "codebuild.amazonaws.com"));
        assert!(services.iter().any(|s| s == "lambda.amazonaws.com"));
    }

    #[test]
    fn test_execution_policy_allows_image_push() {
        let policy = execution_policy().to_string();
        assert!(policy.contains("ecr:PutImage"));
        assert!(policy.contains("s3:GetObject"));
        assert_eq!(inline_policy_name("demo-role"), "demo-role-policy");
    }
}
