//! 🏗️ Provisioning — create it if it's missing, refuse if it's there, update it if you insist.
//!
//! 🎬 *[an operator runs `observer install`. it fails halfway: the role exists, the function doesn't.]*
//! *[the operator runs it again with `--force`. the role is updated. the function is created.]*
//! *[nobody had to remember what was already there. the cloud remembered for us.]*
//!
//! 🧠 Knowledge graph:
//! - [`ManagedResource`]: one named cloud resource. Knows how to probe, create, update, delete
//!   itself, and which error code means "I'm not here".
//! - [`Provisioner::ensure`]: Absent → create. Present + no force → [`ProvisionError::AlreadyProvisioned`],
//!   nothing touched. Present + force → update in place, same ARN.
//! - [`Provisioner::remove`]: best-effort teardown of a list of resources in the given order.
//!   Probes first, deletes only what exists, keeps going when something fails.
//! - Every remote call runs through a [`RetryPolicy`].
//!
//! No state survives a run. Every decision comes from a fresh probe.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::retry::{RemoteError, RetryError, RetryPolicy};

pub mod function;
pub mod observer;
pub mod role;
pub mod rule;

#[cfg(test)]
pub(crate) mod fakes;

pub use function::{FunctionApi, FunctionResource, FunctionSpec, InvocationMode, InvokeOutcome, PermissionGrant};
pub use observer::{ObserverApis, ObserverInstall, ObserverSettings};
pub use role::{RoleApi, RoleResource, RoleSpec};
pub use rule::{RuleApi, RuleResource, RuleSpec};

/// 📛 Every resource of a stack shares this prefix.
pub const RESOURCE_NAME_PREFIX: &str = "resolve-cloud-toolkit-observer-";

/// 📛 Same identifier in, same name out. That's how reruns find their own resources.
pub fn resource_name(identifier: &str) -> String {
    format!("{RESOURCE_NAME_PREFIX}{identifier}")
}

/// 🏷️ The kinds of resource a stack is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Role,
    Function,
    Rule,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResourceKind::Role => "role",
            ResourceKind::Function => "function",
            ResourceKind::Rule => "rule",
        };
        f.write_str(label)
    }
}

/// ✅ What `ensure` found and left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningResult {
    /// was it already there before we started
    pub existed: bool,
    pub resource_arn: String,
}

/// 🧹 What a teardown pass did, resource by resource. Labels look like `role my-role`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub removed: Vec<String>,
    pub absent: Vec<String>,
    /// (label, error message)
    pub failed: Vec<(String, String)>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    /// 🛑 It's already there and nobody said `--force`.
    #[error(
        "({identifier}) {kind} {name} is already provisioned within the account, use --force to update it"
    )]
    AlreadyProvisioned {
        kind: ResourceKind,
        name: String,
        identifier: String,
    },
    /// 🧩 The resource was built for teardown only and has nothing to create or update with.
    #[error("{kind} {name} has no desired configuration, it can only be removed")]
    Unconfigured { kind: ResourceKind, name: String },
    #[error(transparent)]
    Remote(#[from] RetryError),
}

/// 🧱 One named resource the provisioner can reason about.
///
/// Implementations wrap every remote call of `create`, `update` and `delete` in the
/// retry policy they're handed. `probe` is wrapped by the provisioner itself, with the
/// not-found code marked as expected.
#[async_trait]
pub trait ManagedResource: Send + Sync {
    fn kind(&self) -> ResourceKind;
    fn name(&self) -> &str;
    /// the identifier the name was derived from, for error messages
    fn identifier(&self) -> &str;
    /// the provider error code a probe fails with when the resource is absent
    fn not_found_code(&self) -> &'static str;

    /// 🔍 Returns the resource ARN when it exists.
    async fn probe(&self) -> Result<String, RemoteError>;
    /// 🐣 Returns the ARN of the freshly created resource.
    async fn create(&self, retry: &RetryPolicy) -> Result<String, ProvisionError>;
    /// 🔧 Bring an existing resource in line with the desired configuration.
    async fn update(&self, arn: &str, retry: &RetryPolicy) -> Result<(), ProvisionError>;
    async fn delete(&self, retry: &RetryPolicy) -> Result<(), ProvisionError>;

    fn label(&self) -> String {
        format!("{} {}", self.kind(), self.name())
    }
}

/// 🏗️ Drives [`ManagedResource`]s through the ensure/remove state machine.
#[derive(Debug, Clone, Default)]
pub struct Provisioner {
    retry: RetryPolicy,
}

impl Provisioner {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// 🔍 `Some(arn)` when present, `None` when the probe came back with the not-found code.
    pub async fn probe(&self, resource: &dyn ManagedResource) -> Result<Option<String>, RetryError> {
        let operation = format!("probe {}", resource.label());
        let outcome = self
            .retry
            .expecting([resource.not_found_code()])
            .run(&operation, || resource.probe())
            .await;
        match outcome {
            Ok(arn) => Ok(Some(arn)),
            Err(err) if err.is_expected() => {
                debug!("🕳️ {} not found", resource.label());
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// 🚀 Absent → create. Present → refuse, or update when `force` is set.
    pub async fn ensure(
        &self,
        resource: &dyn ManagedResource,
        force: bool,
    ) -> Result<ProvisioningResult, ProvisionError> {
        debug!("🔍 ensuring {}", resource.label());
        match self.probe(resource).await? {
            None => {
                debug!("🐣 {} not found, creating it", resource.label());
                let arn = resource.create(&self.retry).await?;
                info!("✅ created {}", resource.label());
                Ok(ProvisioningResult {
                    existed: false,
                    resource_arn: arn,
                })
            }
            Some(_) if !force => Err(ProvisionError::AlreadyProvisioned {
                kind: resource.kind(),
                name: resource.name().to_string(),
                identifier: resource.identifier().to_string(),
            }),
            Some(arn) => {
                debug!("🔧 {} exists, forcing an update", resource.label());
                resource.update(&arn, &self.retry).await?;
                info!("✅ updated {}", resource.label());
                Ok(ProvisioningResult {
                    existed: true,
                    resource_arn: arn,
                })
            }
        }
    }

    /// 🧹 Tear down `resources` in the order given, best effort.
    ///
    /// Absent resources are skipped without a delete call. A failure (probe or delete)
    /// is logged at `warn`, recorded, and the next resource is attempted anyway. When a
    /// probe fails for a reason other than not-found, the delete is still attempted.
    pub async fn remove(&self, resources: &[&dyn ManagedResource]) -> TeardownReport {
        let mut report = TeardownReport::default();
        for resource in resources {
            let label = resource.label();
            match self.probe(*resource).await {
                Ok(None) => {
                    debug!("🕳️ {label} already gone");
                    report.absent.push(label);
                    continue;
                }
                Ok(Some(_)) => {}
                Err(err) => {
                    warn!("⚠️ could not tell whether {label} exists ({err}), deleting anyway");
                }
            }

            debug!("🗑️ deleting {label}");
            match resource.delete(&self.retry).await {
                Ok(()) => {
                    info!("🗑️ removed {label}");
                    report.removed.push(label);
                }
                Err(err) => {
                    warn!("⚠️ failed to remove {label}: {}", error_chain(&err));
                    report.failed.push((label, error_chain(&err)));
                }
            }
        }
        report
    }
}

/// 🔗 "outer: inner: innermost", for single-line warnings.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
