//! 👀 `observer install | uninstall | invoke | logs | usage`.
//!
//! The observer is a scheduled function that counts what an account holds and
//! reports it to a web hook. Its role, function and rule are all named
//! `resolve-cloud-toolkit-observer-<identifier>`, so several observers can share
//! an account as long as their identifiers differ.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, bail};
use futures::TryStreamExt;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::Context;
use super::cloudwatch::export_group;
use crate::app_config::RuntimeConfig;
use crate::backends::aws::cloudwatch::function_log_group;
use crate::backends::aws::events::EventRules;
use crate::backends::aws::iam::{IamRoles, RoleNameListing};
use crate::backends::aws::lambda::{FunctionNameListing, LambdaFunctions};
use crate::backends::{Destination, Listing};
use crate::pagination::{PaginationSummary, item_stream};
use crate::provisioning::observer::{self, scan_event};
use crate::provisioning::{
    FunctionApi, InvocationMode, ObserverApis, ObserverInstall, ObserverSettings, Provisioner,
    TeardownReport, resource_name,
};
use crate::retry::RetryPolicy;

pub const DEFAULT_IDENTIFIER: &str = "default";
pub const BUNDLE_FILE: &str = "code.zip";
pub const ROLE_POLICY_FILE: &str = "role.json";
/// Account limits the usage report warns about.
pub const FUNCTION_THRESHOLD: u64 = 950;
pub const ROLE_THRESHOLD: u64 = 900;

/// 🔌 The three real adapters, owned here so [`ObserverApis`] can borrow them.
struct LiveApis {
    roles: IamRoles,
    functions: LambdaFunctions,
    rules: EventRules,
}

impl LiveApis {
    fn new(ctx: &Context) -> Self {
        Self {
            roles: IamRoles::new(ctx.clients.iam.clone()),
            functions: LambdaFunctions::new(ctx.clients.lambda.clone()),
            rules: EventRules::new(ctx.clients.events.clone()),
        }
    }

    fn borrow(&self) -> ObserverApis<'_> {
        ObserverApis {
            roles: &self.roles,
            functions: &self.functions,
            rules: &self.rules,
        }
    }
}

pub struct InstallArgs {
    pub web_hook: String,
    pub identifier: String,
    pub skip_build: bool,
    pub force: bool,
    pub bundle: Option<PathBuf>,
    pub role_policy: Option<PathBuf>,
}

/// 📦 Run the configured build command inside the observer directory.
pub async fn build_bundle(dir: &Path, command: &str) -> Result<()> {
    info!("📦 building observer bundle: {command}");
    let status = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(dir)
        .status()
        .await
        .with_context(|| format!("💀 could not start `{command}` in {}", dir.display()))?;
    if !status.success() {
        bail!("💀 `{command}` failed in {} ({status})", dir.display());
    }
    Ok(())
}

/// 📖 Bundle bytes and role policy text, from the flags or from the observer directory.
pub async fn load_settings(runtime: &RuntimeConfig, args: &InstallArgs) -> Result<ObserverSettings> {
    let bundle_path = args
        .bundle
        .clone()
        .unwrap_or_else(|| runtime.observer_dir.join(BUNDLE_FILE));
    let policy_path = args
        .role_policy
        .clone()
        .unwrap_or_else(|| runtime.observer_dir.join(ROLE_POLICY_FILE));

    debug!("📖 reading bundle {} and role policy {}", bundle_path.display(), policy_path.display());
    let bundle = tokio::fs::read(&bundle_path)
        .await
        .with_context(|| format!("💀 could not read the observer bundle {}", bundle_path.display()))?;
    let role_policy = tokio::fs::read_to_string(&policy_path)
        .await
        .with_context(|| format!("💀 could not read the observer role policy {}", policy_path.display()))?;
    serde_json::from_str::<Value>(&role_policy)
        .with_context(|| format!("💀 {} is not a JSON policy document", policy_path.display()))?;

    Ok(ObserverSettings {
        identifier: args.identifier.clone(),
        web_hook: args.web_hook.clone(),
        role_policy: Some(role_policy),
        bundle,
        force: args.force,
    })
}

pub async fn install(ctx: &Context, args: InstallArgs) -> Result<ObserverInstall> {
    if args.skip_build {
        debug!("📦 skipping the bundle build");
    } else {
        build_bundle(
            &ctx.config.runtime.observer_dir,
            &ctx.config.runtime.observer_build_command,
        )
        .await?;
    }
    let settings = load_settings(&ctx.config.runtime, &args).await?;

    let apis = LiveApis::new(ctx);
    let provisioner = Provisioner::new(ctx.retry.clone());
    let installed = observer::install(&provisioner, apis.borrow(), &settings)
        .await
        .with_context(|| format!("💀 ({}) observer install stopped", args.identifier))?;
    Ok(installed)
}

pub async fn uninstall(ctx: &Context, identifier: &str) -> TeardownReport {
    let apis = LiveApis::new(ctx);
    let provisioner = Provisioner::new(ctx.retry.clone());
    observer::uninstall(&provisioner, apis.borrow(), identifier).await
}

/// 📞 Run a scan synchronously and return what the observer said.
///
/// A function error is reported as an error carrying the returned payload.
pub async fn invoke_observer(
    functions: &dyn FunctionApi,
    retry: &RetryPolicy,
    identifier: &str,
    publish: bool,
) -> Result<Value> {
    let name = resource_name(identifier);
    let event = serde_json::to_vec(&scan_event(publish))?;
    let outcome = retry
        .run("Invoke", || functions.invoke(&name, &event, InvocationMode::RequestResponse))
        .await
        .with_context(|| format!("💀 ({identifier}) observer invocation failed"))?;

    let payload = outcome.payload.unwrap_or_default();
    let text = String::from_utf8_lossy(&payload);
    if let Some(kind) = outcome.function_error {
        bail!("💀 ({identifier}) observer failed with {kind}: {text}");
    }
    if payload.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&payload)
        .with_context(|| format!("💀 ({identifier}) observer answered with something that is not JSON: {text}"))
}

pub async fn invoke(ctx: &Context, identifier: &str, publish: bool) -> Result<Value> {
    let functions = LambdaFunctions::new(ctx.clients.lambda.clone());
    invoke_observer(&functions, &ctx.retry, identifier, publish).await
}

/// 📜 Export the observer function's log group to a file, or to stdout without one.
pub async fn logs(ctx: &Context, identifier: &str, file: Option<PathBuf>) -> Result<(usize, PaginationSummary)> {
    let group = function_log_group(&resource_name(identifier));
    let destination = file.map(Destination::File).unwrap_or(Destination::Stdout);
    export_group(ctx, &group, &destination).await
}

/// 📈 How close the account is to its limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageReport {
    pub functions: u64,
    pub roles: u64,
}

impl UsageReport {
    pub fn functions_over_threshold(&self) -> bool {
        self.functions >= FUNCTION_THRESHOLD
    }

    pub fn roles_over_threshold(&self) -> bool {
        self.roles >= ROLE_THRESHOLD
    }
}

async fn count<L>(listing: L) -> Result<u64>
where
    L: Listing,
{
    item_stream(listing)
        .try_fold(0u64, |total, _| async move { Ok::<_, anyhow::Error>(total + 1) })
        .await
}

/// 🧮 Count functions and roles through the lazy item streams.
pub async fn measure_usage<F, R>(functions: F, roles: R) -> Result<UsageReport>
where
    F: Listing,
    R: Listing,
{
    let report = UsageReport {
        functions: count(functions).await.context("💀 could not count functions")?,
        roles: count(roles).await.context("💀 could not count roles")?,
    };
    if report.functions_over_threshold() {
        warn!("⚠️ {} functions, the threshold is {FUNCTION_THRESHOLD}", report.functions);
    }
    if report.roles_over_threshold() {
        warn!("⚠️ {} roles, the threshold is {ROLE_THRESHOLD}", report.roles);
    }
    Ok(report)
}

pub async fn usage(ctx: &Context) -> Result<UsageReport> {
    measure_usage(
        FunctionNameListing::new(ctx.clients.lambda.clone(), ctx.retry.clone()),
        RoleNameListing::new(ctx.clients.iam.clone(), ctx.retry.clone()),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::in_mem::InMemoryListing;
    use crate::common::Page;
    use crate::provisioning::fakes::FakeCloud;
    use crate::retry::RemoteError;
    use serde_json::json;

    fn install_args(dir: &Path) -> InstallArgs {
        InstallArgs {
            web_hook: "https://hook.test".into(),
            identifier: "qa".into(),
            skip_build: true,
            force: false,
            bundle: None,
            role_policy: Some(dir.join("custom-role.json")),
        }
    }

    #[tokio::test]
    async fn the_one_where_the_observer_dir_supplies_the_bundle() -> Result<()> {
        let dir = tempfile::tempdir()?;
        tokio::fs::write(dir.path().join(BUNDLE_FILE), b"PK-zip").await?;
        tokio::fs::write(dir.path().join("custom-role.json"), r#"{"Version":"2012-10-17"}"#).await?;
        let runtime = RuntimeConfig {
            observer_dir: dir.path().to_path_buf(),
            ..RuntimeConfig::default()
        };

        let settings = load_settings(&runtime, &install_args(dir.path())).await?;

        assert_eq!(settings.bundle, b"PK-zip".to_vec());
        assert_eq!(settings.role_policy.as_deref(), Some(r#"{"Version":"2012-10-17"}"#));
        assert_eq!(settings.identifier, "qa");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_missing_bundle_is_named() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let runtime = RuntimeConfig {
            observer_dir: dir.path().to_path_buf(),
            ..RuntimeConfig::default()
        };

        let err = load_settings(&runtime, &install_args(dir.path()))
            .await
            .expect_err("no bundle on disk");

        assert!(err.to_string().contains(BUNDLE_FILE));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_build_command_runs_in_the_observer_dir() -> Result<()> {
        let dir = tempfile::tempdir()?;

        build_bundle(dir.path(), "echo built > marker").await?;
        assert_eq!(tokio::fs::read_to_string(dir.path().join("marker")).await?, "built\n");

        let err = build_bundle(dir.path(), "exit 3").await.expect_err("non-zero exit");
        assert!(err.to_string().contains("exit 3"));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_observer_reports_its_counts() -> Result<()> {
        let cloud = FakeCloud::default();

        let answer = invoke_observer(&cloud, &RetryPolicy::insist(), "qa", false).await?;

        assert_eq!(answer, json!({"lambdaCount": 3, "roleCount": 5}));
        let (name, mode, payload) = cloud.invocations().remove(0);
        assert_eq!(name, "resolve-cloud-toolkit-observer-qa");
        assert_eq!(mode, InvocationMode::RequestResponse);
        assert_eq!(serde_json::from_slice::<Value>(&payload)?, scan_event(false));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_missing_observer_is_not_retried() {
        let cloud = FakeCloud::default();
        cloud.fail_on("invoke", RemoteError::new("ResourceNotFoundException", "Function not found"));

        let err = invoke_observer(&cloud, &RetryPolicy::insist(), "qa", true)
            .await
            .expect_err("nothing installed");

        assert!(format!("{err:#}").contains("(qa) observer invocation failed"));
        assert_eq!(cloud.count("invoke"), 1);
    }

    #[tokio::test]
    async fn the_one_where_usage_is_counted_across_pages() -> Result<()> {
        let functions = InMemoryListing::new(vec![
            Page::new(vec!["f1".to_string(), "f2".to_string()], Some("m1".to_string())),
            Page::last(vec!["f3".to_string()]),
        ]);
        let many_roles: Vec<String> = (0..ROLE_THRESHOLD).map(|n| format!("role-{n}")).collect();
        let roles = InMemoryListing::new(vec![Page::new(many_roles, None::<String>)]);

        let report = measure_usage(functions, roles).await?;

        assert_eq!(report, UsageReport { functions: 3, roles: ROLE_THRESHOLD });
        assert!(!report.functions_over_threshold());
        assert!(report.roles_over_threshold());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_failed_listing_spoils_the_count() {
        let functions = InMemoryListing::<String, String>::new(vec![]).then_fail("AccessDenied");
        let roles = InMemoryListing::<String, String>::new(vec![Page::last(vec![])]);

        let err = measure_usage(functions, roles).await.expect_err("listing fails");
        assert!(format!("{err:#}").contains("could not count functions"));
    }
}
