//! ⏰ EventBridge: the schedule half of the observer.

use async_trait::async_trait;
use aws_sdk_eventbridge::Client;
use aws_sdk_eventbridge::types::Target;

use super::{missing, remote_error};
use crate::provisioning::RuleApi;
use crate::retry::RemoteError;

#[derive(Debug, Clone)]
pub struct EventRules {
    client: Client,
}

impl EventRules {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RuleApi for EventRules {
    async fn describe_rule(&self, name: &str) -> Result<String, RemoteError> {
        let output = self
            .client
            .describe_rule()
            .name(name)
            .send()
            .await
            .map_err(remote_error)?;
        output
            .arn()
            .map(str::to_string)
            .ok_or_else(|| missing("a rule ARN"))
    }

    async fn put_rule(&self, name: &str, schedule: &str) -> Result<String, RemoteError> {
        let output = self
            .client
            .put_rule()
            .name(name)
            .schedule_expression(schedule)
            .send()
            .await
            .map_err(remote_error)?;
        output
            .rule_arn()
            .map(str::to_string)
            .ok_or_else(|| missing("a rule ARN"))
    }

    async fn put_targets(
        &self,
        rule: &str,
        target_id: &str,
        target_arn: &str,
        input: &str,
    ) -> Result<(), RemoteError> {
        let target = Target::builder()
            .id(target_id)
            .arn(target_arn)
            .input(input)
            .build()
            .map_err(|err| RemoteError::uncoded(format!("💀 invalid target {target_id}: {err}")))?;

        let output = self
            .client
            .put_targets()
            .rule(rule)
            .targets(target)
            .send()
            .await
            .map_err(remote_error)?;

        // PutTargets reports per-target failures inside a successful response
        if output.failed_entry_count() > 0 {
            let first = output.failed_entries().first();
            return Err(RemoteError {
                code: first.and_then(|entry| entry.error_code()).map(str::to_string),
                message: first
                    .and_then(|entry| entry.error_message())
                    .unwrap_or("target was rejected")
                    .to_string(),
            });
        }
        Ok(())
    }

    async fn remove_targets(&self, rule: &str, target_ids: &[String]) -> Result<(), RemoteError> {
        self.client
            .remove_targets()
            .rule(rule)
            .set_ids(Some(target_ids.to_vec()))
            .send()
            .await
            .map_err(remote_error)?;
        Ok(())
    }

    async fn delete_rule(&self, name: &str) -> Result<(), RemoteError> {
        self.client
            .delete_rule()
            .name(name)
            .send()
            .await
            .map_err(remote_error)?;
        Ok(())
    }
}
