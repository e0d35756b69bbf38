//! ⚡ Lambda: the function half of the observer, batch invocations, and a function count.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_lambda::Client;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{Environment, FunctionCode, InvocationType, Runtime};

use super::{missing, remote_error};
use crate::backends::Listing;
use crate::common::Page;
use crate::provisioning::{FunctionApi, FunctionSpec, InvocationMode, InvokeOutcome, PermissionGrant};
use crate::retry::{RemoteError, RetryPolicy};

/// 🔌 [`FunctionApi`] over the real Lambda client. One method, one request, no retries here.
#[derive(Debug, Clone)]
pub struct LambdaFunctions {
    client: Client,
}

impl LambdaFunctions {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn environment(spec: &FunctionSpec) -> Environment {
    let variables: HashMap<String, String> = spec
        .environment
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Environment::builder().set_variables(Some(variables)).build()
}

fn invocation_type(mode: InvocationMode) -> InvocationType {
    match mode {
        InvocationMode::RequestResponse => InvocationType::RequestResponse,
        InvocationMode::Event => InvocationType::Event,
        InvocationMode::DryRun => InvocationType::DryRun,
    }
}

#[async_trait]
impl FunctionApi for LambdaFunctions {
    async fn get_function(&self, name: &str) -> Result<String, RemoteError> {
        let output = self
            .client
            .get_function()
            .function_name(name)
            .send()
            .await
            .map_err(remote_error)?;
        output
            .configuration()
            .and_then(|configuration| configuration.function_arn())
            .map(str::to_string)
            .ok_or_else(|| missing("a function ARN"))
    }

    async fn create_function(&self, name: &str, spec: &FunctionSpec) -> Result<String, RemoteError> {
        let output = self
            .client
            .create_function()
            .function_name(name)
            .role(&spec.role_arn)
            .runtime(Runtime::from(spec.runtime.as_str()))
            .handler(&spec.handler)
            .timeout(spec.timeout_seconds)
            .code(FunctionCode::builder().zip_file(Blob::new(spec.bundle.clone())).build())
            .environment(environment(spec))
            .send()
            .await
            .map_err(remote_error)?;
        output
            .function_arn()
            .map(str::to_string)
            .ok_or_else(|| missing("a function ARN"))
    }

    async fn update_function_code(&self, name: &str, bundle: &[u8]) -> Result<(), RemoteError> {
        self.client
            .update_function_code()
            .function_name(name)
            .zip_file(Blob::new(bundle.to_vec()))
            .publish(true)
            .send()
            .await
            .map_err(remote_error)?;
        Ok(())
    }

    async fn update_function_configuration(
        &self,
        name: &str,
        spec: &FunctionSpec,
    ) -> Result<(), RemoteError> {
        self.client
            .update_function_configuration()
            .function_name(name)
            .role(&spec.role_arn)
            .runtime(Runtime::from(spec.runtime.as_str()))
            .handler(&spec.handler)
            .timeout(spec.timeout_seconds)
            .environment(environment(spec))
            .send()
            .await
            .map_err(remote_error)?;
        Ok(())
    }

    async fn delete_function(&self, name: &str) -> Result<(), RemoteError> {
        self.client
            .delete_function()
            .function_name(name)
            .send()
            .await
            .map_err(remote_error)?;
        Ok(())
    }

    async fn add_permission(&self, grant: &PermissionGrant) -> Result<(), RemoteError> {
        self.client
            .add_permission()
            .function_name(&grant.function_name)
            .statement_id(&grant.statement_id)
            .action(&grant.action)
            .principal(&grant.principal)
            .source_arn(&grant.source_arn)
            .send()
            .await
            .map_err(remote_error)?;
        Ok(())
    }

    async fn remove_permission(
        &self,
        function_name: &str,
        statement_id: &str,
    ) -> Result<(), RemoteError> {
        self.client
            .remove_permission()
            .function_name(function_name)
            .statement_id(statement_id)
            .send()
            .await
            .map_err(remote_error)?;
        Ok(())
    }

    async fn invoke(
        &self,
        function_name: &str,
        payload: &[u8],
        mode: InvocationMode,
    ) -> Result<InvokeOutcome, RemoteError> {
        let output = self
            .client
            .invoke()
            .function_name(function_name)
            .invocation_type(invocation_type(mode))
            .payload(Blob::new(payload.to_vec()))
            .send()
            .await
            .map_err(remote_error)?;
        Ok(InvokeOutcome {
            status_code: output.status_code(),
            payload: output.payload().map(|blob| blob.as_ref().to_vec()),
            function_error: output.function_error().map(str::to_string),
        })
    }
}

/// 🔢 Every function name in the account and region, page by page.
#[derive(Debug, Clone)]
pub struct FunctionNameListing {
    client: Client,
    retry: RetryPolicy,
}

impl FunctionNameListing {
    pub fn new(client: Client, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }
}

#[async_trait]
impl Listing for FunctionNameListing {
    type Item = String;
    type Cursor = String;

    async fn fetch_page(&mut self, cursor: Option<String>) -> Result<Page<String, String>> {
        let output = self
            .retry
            .run("ListFunctions", || {
                let request = self.client.list_functions().set_marker(cursor.clone());
                async move { request.send().await.map_err(remote_error) }
            })
            .await?;

        let names = output
            .functions()
            .iter()
            .filter_map(|function| function.function_name().map(str::to_string))
            .collect();
        Ok(Page::new(names, output.next_marker().map(str::to_string)))
    }
}
