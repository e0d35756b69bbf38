//! ⏰ The rule: an alarm clock that pokes the function every eight hours.
//!
//! Wiring a rule to a function takes three things: the rule, a target on the rule,
//! and a permission on the function letting the events service call it. Lambda
//! permissions can't be updated in place, so the statement is removed (if it is
//! there at all) and added again on every create/update.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::function::{FUNCTION_NOT_FOUND, FunctionApi, PermissionGrant};
use super::{ManagedResource, ProvisionError, ResourceKind, resource_name};
use crate::retry::{RemoteError, RetryPolicy};

pub const RULE_NOT_FOUND: &str = "ResourceNotFoundException";
pub const SCHEDULE: &str = "rate(8 hours)";
pub const TARGET_ID: &str = "observer";
pub const PERMISSION_STATEMENT_ID: &str = "cloud-watch-event";
const EVENTS_PRINCIPAL: &str = "events.amazonaws.com";
const INVOKE_ACTION: &str = "lambda:InvokeFunction";

/// 🔌 The slice of EventBridge (née CloudWatch Events) a rule needs.
#[async_trait]
pub trait RuleApi: Send + Sync {
    /// Returns the rule ARN.
    async fn describe_rule(&self, name: &str) -> Result<String, RemoteError>;
    /// Creates or overwrites; returns the rule ARN.
    async fn put_rule(&self, name: &str, schedule: &str) -> Result<String, RemoteError>;
    async fn put_targets(
        &self,
        rule: &str,
        target_id: &str,
        target_arn: &str,
        input: &str,
    ) -> Result<(), RemoteError>;
    async fn remove_targets(&self, rule: &str, target_ids: &[String]) -> Result<(), RemoteError>;
    async fn delete_rule(&self, name: &str) -> Result<(), RemoteError>;
}

/// 📜 Where the rule points and what it says when it gets there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSpec {
    pub function_arn: String,
    pub schedule: String,
    /// JSON event delivered to the target
    pub input: String,
}

impl RuleSpec {
    /// The observer's rule: every eight hours, a publishing scan.
    pub fn observer(function_arn: impl Into<String>) -> Self {
        Self {
            function_arn: function_arn.into(),
            schedule: SCHEDULE.to_string(),
            input: super::observer::scan_event(true).to_string(),
        }
    }
}

pub struct RuleResource<'a> {
    rules: &'a dyn RuleApi,
    functions: &'a dyn FunctionApi,
    identifier: String,
    name: String,
    desired: Option<RuleSpec>,
}

impl<'a> RuleResource<'a> {
    pub fn new(
        rules: &'a dyn RuleApi,
        functions: &'a dyn FunctionApi,
        identifier: &str,
        desired: RuleSpec,
    ) -> Self {
        Self {
            rules,
            functions,
            identifier: identifier.to_string(),
            name: resource_name(identifier),
            desired: Some(desired),
        }
    }

    pub fn teardown(rules: &'a dyn RuleApi, functions: &'a dyn FunctionApi, identifier: &str) -> Self {
        Self {
            rules,
            functions,
            identifier: identifier.to_string(),
            name: resource_name(identifier),
            desired: None,
        }
    }

    fn desired(&self) -> Result<&RuleSpec, ProvisionError> {
        self.desired.as_ref().ok_or_else(|| ProvisionError::Unconfigured {
            kind: ResourceKind::Rule,
            name: self.name.clone(),
        })
    }

    /// 🔗 put rule, put target, then re-grant the invoke permission.
    async fn wire(&self, retry: &RetryPolicy) -> Result<String, ProvisionError> {
        let desired = self.desired()?;

        debug!("⏰ putting rule {} ({})", self.name, desired.schedule);
        let rule_arn = retry
            .run("PutRule", || self.rules.put_rule(&self.name, &desired.schedule))
            .await?;

        debug!("🎯 pointing rule {} at {}", self.name, desired.function_arn);
        retry
            .run("PutTargets", || {
                self.rules
                    .put_targets(&self.name, TARGET_ID, &desired.function_arn, &desired.input)
            })
            .await?;

        let dropped = retry
            .expecting([FUNCTION_NOT_FOUND])
            .run("RemovePermission", || {
                self.functions
                    .remove_permission(&desired.function_arn, PERMISSION_STATEMENT_ID)
            })
            .await;
        if let Err(err) = dropped {
            debug!("🤷 no previous {PERMISSION_STATEMENT_ID} permission to drop: {err}");
        }

        let grant = PermissionGrant {
            function_name: desired.function_arn.clone(),
            statement_id: PERMISSION_STATEMENT_ID.to_string(),
            action: INVOKE_ACTION.to_string(),
            principal: EVENTS_PRINCIPAL.to_string(),
            source_arn: rule_arn.clone(),
        };
        debug!("🔐 letting {EVENTS_PRINCIPAL} invoke {}", desired.function_arn);
        retry
            .run("AddPermission", || self.functions.add_permission(&grant))
            .await?;

        Ok(rule_arn)
    }
}

#[async_trait]
impl ManagedResource for RuleResource<'_> {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Rule
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn not_found_code(&self) -> &'static str {
        RULE_NOT_FOUND
    }

    async fn probe(&self) -> Result<String, RemoteError> {
        self.rules.describe_rule(&self.name).await
    }

    async fn create(&self, retry: &RetryPolicy) -> Result<String, ProvisionError> {
        self.wire(retry).await
    }

    async fn update(&self, _arn: &str, retry: &RetryPolicy) -> Result<(), ProvisionError> {
        self.wire(retry).await.map(|_| ())
    }

    async fn delete(&self, retry: &RetryPolicy) -> Result<(), ProvisionError> {
        // a rule with targets can't be deleted
        // both calls are attempted; the first failure is the one reported
        let target_ids = vec![TARGET_ID.to_string()];
        let targets = retry
            .run("RemoveTargets", || self.rules.remove_targets(&self.name, &target_ids))
            .await;
        if let Err(err) = &targets {
            warn!(rule = %self.name, error = %err, "🧹 targets would not go, trying the rule anyway");
        }
        let rule = retry
            .run("DeleteRule", || self.rules.delete_rule(&self.name))
            .await;
        targets?;
        rule?;
        Ok(())
    }
}
