//! ⚡ The function: a zip file, a runtime, and fifteen minutes of freedom every eight hours.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::debug;

use super::{ManagedResource, ProvisionError, ResourceKind, resource_name};
use crate::retry::{RemoteError, RetryPolicy};

/// Lambda's not-found code, for functions and for permission statements alike.
pub const FUNCTION_NOT_FOUND: &str = "ResourceNotFoundException";

pub const RUNTIME: &str = "nodejs10.x";
pub const HANDLER: &str = "lib/handler.execute";
pub const TIMEOUT_SECONDS: i32 = 900;
/// The environment variable the deployed observer reads its web hook from.
pub const WEB_HOOK_VARIABLE: &str = "RESOLVE_OBSERVER_WEB_HOOK";

/// 📨 How an invocation should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationMode {
    /// wait for the result
    RequestResponse,
    /// fire and forget
    Event,
    /// only check that the call would be allowed
    DryRun,
}

/// 📬 What came back from an invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvokeOutcome {
    pub status_code: i32,
    pub payload: Option<Vec<u8>>,
    /// set when the function itself threw
    pub function_error: Option<String>,
}

/// 🔐 A resource-based policy statement on a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionGrant {
    pub function_name: String,
    pub statement_id: String,
    pub action: String,
    pub principal: String,
    pub source_arn: String,
}

/// 📜 Everything needed to create or reconfigure a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSpec {
    pub role_arn: String,
    pub bundle: Vec<u8>,
    pub runtime: String,
    pub handler: String,
    pub timeout_seconds: i32,
    pub environment: BTreeMap<String, String>,
}

impl FunctionSpec {
    /// The observer's function: fixed runtime/handler/timeout, web hook in the environment.
    pub fn observer(role_arn: impl Into<String>, bundle: Vec<u8>, web_hook: &str) -> Self {
        Self {
            role_arn: role_arn.into(),
            bundle,
            runtime: RUNTIME.to_string(),
            handler: HANDLER.to_string(),
            timeout_seconds: TIMEOUT_SECONDS,
            environment: BTreeMap::from([(WEB_HOOK_VARIABLE.to_string(), web_hook.to_string())]),
        }
    }
}

/// 🔌 The slice of Lambda the toolkit talks to. One method, one remote call.
#[async_trait]
pub trait FunctionApi: Send + Sync {
    /// Returns the function ARN.
    async fn get_function(&self, name: &str) -> Result<String, RemoteError>;
    /// Returns the new function ARN.
    async fn create_function(&self, name: &str, spec: &FunctionSpec) -> Result<String, RemoteError>;
    /// Uploads and publishes new code.
    async fn update_function_code(&self, name: &str, bundle: &[u8]) -> Result<(), RemoteError>;
    /// Role, environment and timeout.
    async fn update_function_configuration(
        &self,
        name: &str,
        spec: &FunctionSpec,
    ) -> Result<(), RemoteError>;
    async fn delete_function(&self, name: &str) -> Result<(), RemoteError>;
    async fn add_permission(&self, grant: &PermissionGrant) -> Result<(), RemoteError>;
    async fn remove_permission(&self, function_name: &str, statement_id: &str)
    -> Result<(), RemoteError>;
    async fn invoke(
        &self,
        function_name: &str,
        payload: &[u8],
        mode: InvocationMode,
    ) -> Result<InvokeOutcome, RemoteError>;
}

pub struct FunctionResource<'a> {
    api: &'a dyn FunctionApi,
    identifier: String,
    name: String,
    desired: Option<FunctionSpec>,
}

impl<'a> FunctionResource<'a> {
    pub fn new(api: &'a dyn FunctionApi, identifier: &str, desired: FunctionSpec) -> Self {
        Self {
            api,
            identifier: identifier.to_string(),
            name: resource_name(identifier),
            desired: Some(desired),
        }
    }

    pub fn teardown(api: &'a dyn FunctionApi, identifier: &str) -> Self {
        Self {
            api,
            identifier: identifier.to_string(),
            name: resource_name(identifier),
            desired: None,
        }
    }

    fn desired(&self) -> Result<&FunctionSpec, ProvisionError> {
        self.desired.as_ref().ok_or_else(|| ProvisionError::Unconfigured {
            kind: ResourceKind::Function,
            name: self.name.clone(),
        })
    }
}

#[async_trait]
impl ManagedResource for FunctionResource<'_> {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Function
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn not_found_code(&self) -> &'static str {
        FUNCTION_NOT_FOUND
    }

    async fn probe(&self) -> Result<String, RemoteError> {
        self.api.get_function(&self.name).await
    }

    async fn create(&self, retry: &RetryPolicy) -> Result<String, ProvisionError> {
        let desired = self.desired()?;
        debug!("⚡ creating function {} ({} byte bundle)", self.name, desired.bundle.len());
        let arn = retry
            .run("CreateFunction", || self.api.create_function(&self.name, desired))
            .await?;
        Ok(arn)
    }

    async fn update(&self, _arn: &str, retry: &RetryPolicy) -> Result<(), ProvisionError> {
        let desired = self.desired()?;
        debug!("📦 publishing new code for {}", self.name);
        retry
            .run("UpdateFunctionCode", || {
                self.api.update_function_code(&self.name, &desired.bundle)
            })
            .await?;
        debug!("🔧 updating configuration of {}", self.name);
        retry
            .run("UpdateFunctionConfiguration", || {
                self.api.update_function_configuration(&self.name, desired)
            })
            .await?;
        Ok(())
    }

    async fn delete(&self, retry: &RetryPolicy) -> Result<(), ProvisionError> {
        retry
            .run("DeleteFunction", || self.api.delete_function(&self.name))
            .await?;
        Ok(())
    }
}
