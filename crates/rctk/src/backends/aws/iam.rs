//! 🎭 IAM: the role half of the observer, and a role count for the usage report.

use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_iam::Client;

use super::{missing, remote_error};
use crate::backends::Listing;
use crate::common::Page;
use crate::provisioning::RoleApi;
use crate::retry::{RemoteError, RetryPolicy};

#[derive(Debug, Clone)]
pub struct IamRoles {
    client: Client,
}

impl IamRoles {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RoleApi for IamRoles {
    async fn get_role(&self, name: &str) -> Result<String, RemoteError> {
        let output = self
            .client
            .get_role()
            .role_name(name)
            .send()
            .await
            .map_err(remote_error)?;
        output
            .role()
            .map(|role| role.arn().to_string())
            .ok_or_else(|| missing("a role"))
    }

    async fn create_role(
        &self,
        name: &str,
        trust_policy: &str,
        description: &str,
    ) -> Result<String, RemoteError> {
        let output = self
            .client
            .create_role()
            .role_name(name)
            .assume_role_policy_document(trust_policy)
            .description(description)
            .send()
            .await
            .map_err(remote_error)?;
        output
            .role()
            .map(|role| role.arn().to_string())
            .ok_or_else(|| missing("a role"))
    }

    async fn put_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        document: &str,
    ) -> Result<(), RemoteError> {
        self.client
            .put_role_policy()
            .role_name(role_name)
            .policy_name(policy_name)
            .policy_document(document)
            .send()
            .await
            .map_err(remote_error)?;
        Ok(())
    }

    async fn delete_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
    ) -> Result<(), RemoteError> {
        self.client
            .delete_role_policy()
            .role_name(role_name)
            .policy_name(policy_name)
            .send()
            .await
            .map_err(remote_error)?;
        Ok(())
    }

    async fn delete_role(&self, name: &str) -> Result<(), RemoteError> {
        self.client
            .delete_role()
            .role_name(name)
            .send()
            .await
            .map_err(remote_error)?;
        Ok(())
    }
}

/// 🔢 Every role name in the account. IAM pages with a marker plus an `IsTruncated` flag.
#[derive(Debug, Clone)]
pub struct RoleNameListing {
    client: Client,
    retry: RetryPolicy,
}

impl RoleNameListing {
    pub fn new(client: Client, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }
}

#[async_trait]
impl Listing for RoleNameListing {
    type Item = String;
    type Cursor = String;

    async fn fetch_page(&mut self, cursor: Option<String>) -> Result<Page<String, String>> {
        let output = self
            .retry
            .run("ListRoles", || {
                let request = self.client.list_roles().set_marker(cursor.clone());
                async move { request.send().await.map_err(remote_error) }
            })
            .await?;

        let names = output
            .roles()
            .iter()
            .map(|role| role.role_name().to_string())
            .collect();
        let next = if output.is_truncated() {
            output.marker().map(str::to_string)
        } else {
            None
        };
        Ok(Page::new(names, next))
    }
}
