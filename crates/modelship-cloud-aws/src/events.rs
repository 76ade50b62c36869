//! CloudWatch Events keep-warm rule

use crate::cli::AwsCli;
use crate::error::{AwsError, Result};
use crate::lambda::Lambda;
use async_trait::async_trait;
use modelship_cloud::{
    CloudError, CloudResource, FunctionRef, ProviderHandle, ResourceKind, ResourceStatus,
    ScheduleRef,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct PutRuleOutput {
    #[serde(rename = "RuleArn")]
    rule_arn: String,
}

#[derive(Debug, Deserialize)]
struct DescribeRuleOutput {
    #[serde(rename = "State", default)]
    state: Option<String>,
}

/// Target id used for the function behind a rule
pub fn target_id(rule_name: &str) -> String {
    format!("{}-target", rule_name)
}

pub struct Events {
    cli: AwsCli,
}

impl Events {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }

    /// Create an enabled rule invoking `target` on `schedule_expression`.
    ///
    /// The rule is removed again if the target or permission cannot be added.
    pub async fn create_rule(
        &self,
        lambda: &Lambda,
        name: &str,
        target: &FunctionRef,
        schedule_expression: &str,
    ) -> Result<ScheduleRef> {
        let rule: PutRuleOutput = self
            .cli
            .run_json(&[
                "events",
                "put-rule",
                "--name",
                name,
                "--schedule-expression",
                schedule_expression,
                "--state",
                "ENABLED",
                "--description",
                "modelship keep-warm",
            ])
            .await?;

        let target_id = target_id(name);
        if let Err(e) = self.attach(lambda, name, &rule.rule_arn, &target_id, target).await {
            tracing::warn!(rule = name, "Rule setup failed, removing rule");
            self.cli
                .cleanup(&["events", "remove-targets", "--rule", name, "--ids", &target_id])
                .await;
            self.cli
                .cleanup(&["events", "delete-rule", "--name", name])
                .await;
            return Err(e);
        }

        tracing::info!(rule = name, schedule = schedule_expression, "Created schedule rule");
        Ok(ScheduleRef {
            rule_name: name.to_string(),
            rule_arn: rule.rule_arn,
            target_id,
            region: self.cli.region().to_string(),
        })
    }

    async fn attach(
        &self,
        lambda: &Lambda,
        rule_name: &str,
        rule_arn: &str,
        target_id: &str,
        target: &FunctionRef,
    ) -> Result<()> {
        let targets = format!("Id={},Arn={}", target_id, target.function_arn);
        self.cli
            .run(&["events", "put-targets", "--rule", rule_name, "--targets", &targets])
            .await?;

        let statement_id = format!("{}-invoke", rule_name);
        lambda
            .add_permission(target, &statement_id, "events.amazonaws.com", rule_arn)
            .await
    }
}

fn schedule_ref(handle: &ProviderHandle) -> modelship_cloud::Result<&ScheduleRef> {
    match handle {
        ProviderHandle::ScheduleRule(rule) => Ok(rule),
        other => Err(CloudError::Validation(format!(
            "Events client cannot handle {} resources",
            other.kind()
        ))),
    }
}

#[async_trait]
impl CloudResource for Events {
    fn kind(&self) -> ResourceKind {
        ResourceKind::ScheduleRule
    }

    async fn describe(&self, handle: &ProviderHandle) -> modelship_cloud::Result<ResourceStatus> {
        let rule = schedule_ref(handle)?;
        let output: DescribeRuleOutput = self
            .cli
            .for_region(Some(&rule.region))
            .run_json(&["events", "describe-rule", "--name", &rule.rule_name])
            .await?;

        Ok(match output.state.as_deref() {
            Some("ENABLED") => ResourceStatus::Active,
            _ => ResourceStatus::Pending,
        })
    }

    /// Remove the targets, then the rule
    async fn destroy(&self, handle: &ProviderHandle) -> modelship_cloud::Result<()> {
        let rule = schedule_ref(handle)?;
        let cli = self.cli.for_region(Some(&rule.region));

        match cli
            .run(&[
                "events",
                "remove-targets",
                "--rule",
                &rule.rule_name,
                "--ids",
                &rule.target_id,
            ])
            .await
        {
            Ok(_) | Err(AwsError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        cli.run(&["events", "delete-rule", "--name", &rule.rule_name])
            .await?;
        tracing::info!(rule = %rule.rule_name, "Deleted schedule rule");
        Ok(())
    }
}
