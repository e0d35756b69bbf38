//! 🎭 The role: who the function gets to be when it wakes up.

use async_trait::async_trait;
use tracing::debug;

use super::{ManagedResource, ProvisionError, ResourceKind, resource_name};
use crate::retry::{RemoteError, RetryPolicy};

/// The one inline policy a managed role carries.
pub const INLINE_POLICY_NAME: &str = "general-policy";

const ROLE_DESCRIPTION: &str = "rctk observer role";

/// 🔌 The slice of IAM a role resource needs. Every method is a single remote call.
#[async_trait]
pub trait RoleApi: Send + Sync {
    /// Returns the role ARN.
    async fn get_role(&self, name: &str) -> Result<String, RemoteError>;
    /// Returns the new role ARN.
    async fn create_role(
        &self,
        name: &str,
        trust_policy: &str,
        description: &str,
    ) -> Result<String, RemoteError>;
    async fn put_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        document: &str,
    ) -> Result<(), RemoteError>;
    async fn delete_role_policy(&self, role_name: &str, policy_name: &str)
    -> Result<(), RemoteError>;
    async fn delete_role(&self, name: &str) -> Result<(), RemoteError>;
}

/// IAM says "NoSuchEntity" when a role (or its policy) isn't there.
pub const ROLE_NOT_FOUND: &str = "NoSuchEntity";

/// 📜 What the role should look like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSpec {
    /// assume-role policy document (JSON)
    pub trust_policy: String,
    /// permissions, stored as the `general-policy` inline policy
    pub inline_policy: Option<String>,
}

pub struct RoleResource<'a> {
    api: &'a dyn RoleApi,
    identifier: String,
    name: String,
    desired: Option<RoleSpec>,
}

impl<'a> RoleResource<'a> {
    pub fn new(api: &'a dyn RoleApi, identifier: &str, desired: RoleSpec) -> Self {
        Self {
            api,
            identifier: identifier.to_string(),
            name: resource_name(identifier),
            desired: Some(desired),
        }
    }

    /// A handle that can only be probed and deleted.
    pub fn teardown(api: &'a dyn RoleApi, identifier: &str) -> Self {
        Self {
            api,
            identifier: identifier.to_string(),
            name: resource_name(identifier),
            desired: None,
        }
    }

    fn desired(&self) -> Result<&RoleSpec, ProvisionError> {
        self.desired.as_ref().ok_or_else(|| ProvisionError::Unconfigured {
            kind: ResourceKind::Role,
            name: self.name.clone(),
        })
    }

    async fn put_inline_policy(&self, retry: &RetryPolicy) -> Result<(), ProvisionError> {
        let Some(document) = self.desired()?.inline_policy.as_deref() else {
            return Ok(());
        };
        debug!("📜 updating role {} inline policy {INLINE_POLICY_NAME}", self.name);
        retry
            .run("PutRolePolicy", || {
                self.api.put_role_policy(&self.name, INLINE_POLICY_NAME, document)
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ManagedResource for RoleResource<'_> {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Role
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn not_found_code(&self) -> &'static str {
        ROLE_NOT_FOUND
    }

    async fn probe(&self) -> Result<String, RemoteError> {
        self.api.get_role(&self.name).await
    }

    async fn create(&self, retry: &RetryPolicy) -> Result<String, ProvisionError> {
        let desired = self.desired()?;
        let arn = retry
            .run("CreateRole", || {
                self.api
                    .create_role(&self.name, &desired.trust_policy, ROLE_DESCRIPTION)
            })
            .await?;
        self.put_inline_policy(retry).await?;
        Ok(arn)
    }

    async fn update(&self, _arn: &str, retry: &RetryPolicy) -> Result<(), ProvisionError> {
        self.put_inline_policy(retry).await
    }

    async fn delete(&self, retry: &RetryPolicy) -> Result<(), ProvisionError> {
        // IAM refuses to delete a role that still has inline policies
        let detached = retry
            .expecting([ROLE_NOT_FOUND])
            .run("DeleteRolePolicy", || {
                self.api.delete_role_policy(&self.name, INLINE_POLICY_NAME)
            })
            .await;
        match detached {
            Ok(()) => {}
            Err(err) if err.is_expected() => debug!("role {} had no inline policy", self.name),
            Err(err) => return Err(err.into()),
        }
        retry
            .run("DeleteRole", || self.api.delete_role(&self.name))
            .await?;
        Ok(())
    }
}

/// 🤝 Lets Lambda (and anyone in the account) assume the role.
pub fn lambda_trust_policy() -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": "lambda.amazonaws.com", "AWS": "*" },
            "Action": "sts:AssumeRole"
        }]
    })
    .to_string()
}
