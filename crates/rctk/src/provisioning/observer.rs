//! 👀 The observer stack: role → function → rule, installed together, removed together.
//!
//! Install walks forward because each step needs the previous one's ARN. Uninstall
//! walks backwards (rule, function, role) and never stops early.

use serde_json::{Value, json};
use tracing::info;

use super::{
    FunctionApi, FunctionResource, FunctionSpec, ProvisionError, Provisioner, ProvisioningResult,
    RoleApi, RoleResource, RoleSpec, RuleApi, RuleResource, RuleSpec, TeardownReport,
};

/// 📨 The event the observer understands: "go count things, and maybe tell someone".
pub fn scan_event(publish: bool) -> Value {
    json!({ "name": "scan", "payload": { "publish": publish } })
}

/// 🔌 The three APIs a stack touches. Borrowed, never owned.
#[derive(Clone, Copy)]
pub struct ObserverApis<'a> {
    pub roles: &'a dyn RoleApi,
    pub functions: &'a dyn FunctionApi,
    pub rules: &'a dyn RuleApi,
}

/// ⚙️ Everything `install` needs to know.
#[derive(Debug, Clone)]
pub struct ObserverSettings {
    pub identifier: String,
    pub web_hook: String,
    /// inline permissions policy document for the role
    pub role_policy: Option<String>,
    /// the packaged function code
    pub bundle: Vec<u8>,
    pub force: bool,
}

/// ✅ One result per resource, in install order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverInstall {
    pub role: ProvisioningResult,
    pub function: ProvisioningResult,
    pub rule: ProvisioningResult,
}

/// 🚀 Ensure role, then function (with the role ARN), then rule (with the function ARN).
///
/// Fails fast. Whatever was ensured before the failure stays, and a rerun with
/// `force` picks up from there.
pub async fn install(
    provisioner: &Provisioner,
    apis: ObserverApis<'_>,
    settings: &ObserverSettings,
) -> Result<ObserverInstall, ProvisionError> {
    let identifier = settings.identifier.as_str();

    let role = RoleResource::new(
        apis.roles,
        identifier,
        RoleSpec {
            trust_policy: super::role::lambda_trust_policy(),
            inline_policy: settings.role_policy.clone(),
        },
    );
    let role = provisioner.ensure(&role, settings.force).await?;

    let function = FunctionResource::new(
        apis.functions,
        identifier,
        FunctionSpec::observer(&role.resource_arn, settings.bundle.clone(), &settings.web_hook),
    );
    let function = provisioner.ensure(&function, settings.force).await?;

    let rule = RuleResource::new(
        apis.rules,
        apis.functions,
        identifier,
        RuleSpec::observer(&function.resource_arn),
    );
    let rule = provisioner.ensure(&rule, settings.force).await?;

    info!("👀 ({identifier}) observer installed");
    Ok(ObserverInstall {
        role,
        function,
        rule,
    })
}

/// 🧹 Rule, function, role. Best effort, never fails.
pub async fn uninstall(
    provisioner: &Provisioner,
    apis: ObserverApis<'_>,
    identifier: &str,
) -> TeardownReport {
    let rule = RuleResource::teardown(apis.rules, apis.functions, identifier);
    let function = FunctionResource::teardown(apis.functions, identifier);
    let role = RoleResource::teardown(apis.roles, identifier);

    let report = provisioner.remove(&[&rule, &function, &role]).await;
    info!(
        removed = report.removed.len(),
        absent = report.absent.len(),
        failed = report.failed.len(),
        "🧹 ({identifier}) observer uninstall finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provisioning::fakes::FakeCloud;
    use crate::retry::{RemoteError, RetryPolicy};

    fn settings(force: bool) -> ObserverSettings {
        ObserverSettings {
            identifier: "qa".into(),
            web_hook: "https://hook.test".into(),
            role_policy: Some("{\"Version\":\"2012-10-17\",\"Statement\":[]}".into()),
            bundle: b"PK fake zip".to_vec(),
            force,
        }
    }

    fn apis(cloud: &FakeCloud) -> ObserverApis<'_> {
        ObserverApis {
            roles: cloud,
            functions: cloud,
            rules: cloud,
        }
    }

    #[tokio::test]
    async fn the_one_where_the_stack_goes_up_in_dependency_order() {
        let cloud = FakeCloud::default();
        let provisioner = Provisioner::new(RetryPolicy::insist());

        let installed = install(&provisioner, apis(&cloud), &settings(false))
            .await
            .expect("fresh install works");

        let creates: Vec<_> = cloud
            .mutations()
            .into_iter()
            .filter(|call| call.starts_with("create") || call == "put_rule")
            .collect();
        assert_eq!(creates, vec!["create_role", "create_function", "put_rule"]);
        assert_eq!(cloud.function_role("resolve-cloud-toolkit-observer-qa"), Some(installed.role.resource_arn));
        assert!(!installed.rule.existed);
    }

    #[tokio::test]
    async fn the_one_where_a_second_install_needs_force() {
        let cloud = FakeCloud::default();
        let provisioner = Provisioner::new(RetryPolicy::insist());
        install(&provisioner, apis(&cloud), &settings(false))
            .await
            .expect("first install works");

        let err = install(&provisioner, apis(&cloud), &settings(false))
            .await
            .expect_err("second install without force is refused");
        assert!(err.to_string().contains("(qa) role"));

        let again = install(&provisioner, apis(&cloud), &settings(true))
            .await
            .expect("forced install works");
        assert!(again.role.existed && again.function.existed && again.rule.existed);
        assert_eq!(cloud.count("create_function"), 1);
    }

    #[tokio::test]
    async fn the_one_where_a_half_built_stack_is_resumed() {
        let cloud = FakeCloud::default();
        cloud.fail_on("create_function", RemoteError::new("InvalidParameterValueException", "role not ready"));
        let provisioner = Provisioner::new(RetryPolicy::insist());

        install(&provisioner, apis(&cloud), &settings(false))
            .await
            .expect_err("function step fails");
        assert_eq!(cloud.count("create_role"), 1);

        cloud.clear_failures();
        let resumed = install(&provisioner, apis(&cloud), &settings(true))
            .await
            .expect("rerun with force resumes");
        assert!(resumed.role.existed);
        assert!(!resumed.function.existed);
        assert_eq!(cloud.count("create_role"), 1);
    }

    #[tokio::test]
    async fn the_one_where_everything_comes_down_in_reverse() {
        let cloud = FakeCloud::default();
        let provisioner = Provisioner::new(RetryPolicy::insist());
        install(&provisioner, apis(&cloud), &settings(false))
            .await
            .expect("install works");

        let report = uninstall(&provisioner, apis(&cloud), "qa").await;

        assert!(report.is_clean());
        assert_eq!(
            report.removed,
            vec![
                "rule resolve-cloud-toolkit-observer-qa".to_string(),
                "function resolve-cloud-toolkit-observer-qa".to_string(),
                "role resolve-cloud-toolkit-observer-qa".to_string(),
            ]
        );

        let second = uninstall(&provisioner, apis(&cloud), "qa").await;
        assert_eq!(second.absent.len(), 3);
        assert!(second.removed.is_empty());
    }
}
