//! 🎭 A pretend AWS account that lives in a `Mutex` and writes down everything you ask of it.
//!
//! Implements [`RoleApi`], [`FunctionApi`] and [`RuleApi`] with the same not-found /
//! already-exists codes the real services use, plus knobs for injecting failures
//! (`fail_on`) and throttling (`throttle`).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::function::{FUNCTION_NOT_FOUND, FunctionApi, FunctionSpec, InvocationMode, InvokeOutcome, PermissionGrant};
use super::role::{ROLE_NOT_FOUND, RoleApi};
use super::rule::{RULE_NOT_FOUND, RuleApi};
use crate::retry::RemoteError;

const ACCOUNT: &str = "123456789012";
const REGION: &str = "eu-west-1";

#[derive(Debug, Default)]
struct FakeRole {
    arn: String,
    policies: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct FakeFunction {
    arn: String,
    role_arn: String,
    code_versions: u32,
}

#[derive(Debug, Default)]
struct FakeRule {
    arn: String,
    targets: Vec<String>,
}

#[derive(Debug, Default)]
struct State {
    roles: BTreeMap<String, FakeRole>,
    functions: BTreeMap<String, FakeFunction>,
    rules: BTreeMap<String, FakeRule>,
    grants: Vec<PermissionGrant>,
    calls: Vec<String>,
    failures: HashMap<String, RemoteError>,
    throttles: HashMap<String, u32>,
    failing_targets: HashSet<String>,
    invocations: Vec<(String, InvocationMode, Vec<u8>)>,
}

#[derive(Debug, Default)]
pub(crate) struct FakeCloud {
    state: Mutex<State>,
}

fn role_arn(name: &str) -> String {
    format!("arn:aws:iam::{ACCOUNT}:role/{name}")
}

fn function_arn(name: &str) -> String {
    format!("arn:aws:lambda:{REGION}:{ACCOUNT}:function:{name}")
}

fn rule_arn(name: &str) -> String {
    format!("arn:aws:events:{REGION}:{ACCOUNT}:rule/{name}")
}

/// Lambda accepts either a bare name or a full ARN.
fn function_key(name_or_arn: &str) -> &str {
    name_or_arn.rsplit(':').next().unwrap_or(name_or_arn)
}

impl FakeCloud {
    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut guard = self.state.lock().expect("fake cloud lock poisoned");
        f(&mut guard)
    }

    /// 📝 Log the call, then apply any injected throttling or failure.
    fn enter(&self, call: &str) -> Result<(), RemoteError> {
        self.with_state(|state| {
            state.calls.push(call.to_string());
            if let Some(remaining) = state.throttles.get_mut(call)
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(RemoteError::new("ThrottlingException", "Rate exceeded"));
            }
            match state.failures.get(call) {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        })
    }

    pub fn seed_role(&self, name: &str) {
        self.with_state(|state| {
            state.roles.insert(
                name.to_string(),
                FakeRole {
                    arn: role_arn(name),
                    ..FakeRole::default()
                },
            );
        });
    }

    pub fn seed_function(&self, name: &str) {
        self.with_state(|state| {
            state.functions.insert(
                name.to_string(),
                FakeFunction {
                    arn: function_arn(name),
                    ..FakeFunction::default()
                },
            );
        });
    }

    pub fn seed_rule(&self, name: &str) {
        self.with_state(|state| {
            state.rules.insert(
                name.to_string(),
                FakeRule {
                    arn: rule_arn(name),
                    targets: vec!["observer".to_string()],
                },
            );
        });
    }

    /// 💀 Every call to `call` fails with `error` until [`clear_failures`](Self::clear_failures).
    pub fn fail_on(&self, call: &str, error: RemoteError) {
        self.with_state(|state| {
            state.failures.insert(call.to_string(), error);
        });
    }

    /// 🐢 The next `times` calls to `call` get throttled.
    pub fn throttle(&self, call: &str, times: u32) {
        self.with_state(|state| {
            state.throttles.insert(call.to_string(), times);
        });
    }

    /// 💀 Invocations of this one target fail.
    pub fn fail_target(&self, target: &str) {
        self.with_state(|state| {
            state.failing_targets.insert(target.to_string());
        });
    }

    pub fn clear_failures(&self) {
        self.with_state(|state| state.failures.clear());
    }

    pub fn calls(&self) -> Vec<String> {
        self.with_state(|state| state.calls.clone())
    }

    /// Calls that change something: everything but reads and invocations.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| {
                !(call.starts_with("get_") || call.starts_with("describe_") || call == "invoke")
            })
            .collect()
    }

    pub fn count(&self, call: &str) -> usize {
        self.with_state(|state| state.calls.iter().filter(|c| *c == call).count())
    }

    pub fn grants(&self) -> Vec<PermissionGrant> {
        self.with_state(|state| state.grants.clone())
    }

    pub fn function_role(&self, name: &str) -> Option<String> {
        self.with_state(|state| state.functions.get(name).map(|f| f.role_arn.clone()))
    }

    pub fn code_versions(&self, name: &str) -> Option<u32> {
        self.with_state(|state| state.functions.get(name).map(|f| f.code_versions))
    }

    pub fn role_policy(&self, role: &str, policy: &str) -> Option<String> {
        self.with_state(|state| {
            state
                .roles
                .get(role)
                .and_then(|r| r.policies.get(policy).cloned())
        })
    }

    pub fn invocations(&self) -> Vec<(String, InvocationMode, Vec<u8>)> {
        self.with_state(|state| state.invocations.clone())
    }
}

#[async_trait]
impl RoleApi for FakeCloud {
    async fn get_role(&self, name: &str) -> Result<String, RemoteError> {
        self.enter("get_role")?;
        self.with_state(|state| match state.roles.get(name) {
            Some(role) => Ok(role.arn.clone()),
            None => Err(RemoteError::new(ROLE_NOT_FOUND, format!("role {name} not found"))),
        })
    }

    async fn create_role(&self, name: &str, _trust: &str, _description: &str) -> Result<String, RemoteError> {
        self.enter("create_role")?;
        self.with_state(|state| {
            if state.roles.contains_key(name) {
                return Err(RemoteError::new("EntityAlreadyExists", format!("role {name} exists")));
            }
            let arn = role_arn(name);
            state.roles.insert(
                name.to_string(),
                FakeRole {
                    arn: arn.clone(),
                    ..FakeRole::default()
                },
            );
            Ok(arn)
        })
    }

    async fn put_role_policy(&self, role_name: &str, policy_name: &str, document: &str) -> Result<(), RemoteError> {
        self.enter("put_role_policy")?;
        self.with_state(|state| match state.roles.get_mut(role_name) {
            Some(role) => {
                role.policies.insert(policy_name.to_string(), document.to_string());
                Ok(())
            }
            None => Err(RemoteError::new(ROLE_NOT_FOUND, "no such role")),
        })
    }

    async fn delete_role_policy(&self, role_name: &str, policy_name: &str) -> Result<(), RemoteError> {
        self.enter("delete_role_policy")?;
        self.with_state(|state| {
            match state
                .roles
                .get_mut(role_name)
                .and_then(|role| role.policies.remove(policy_name))
            {
                Some(_) => Ok(()),
                None => Err(RemoteError::new(ROLE_NOT_FOUND, "no such policy")),
            }
        })
    }

    async fn delete_role(&self, name: &str) -> Result<(), RemoteError> {
        self.enter("delete_role")?;
        self.with_state(|state| match state.roles.remove(name) {
            Some(_) => Ok(()),
            None => Err(RemoteError::new(ROLE_NOT_FOUND, "no such role")),
        })
    }
}

#[async_trait]
impl FunctionApi for FakeCloud {
    async fn get_function(&self, name: &str) -> Result<String, RemoteError> {
        self.enter("get_function")?;
        self.with_state(|state| match state.functions.get(function_key(name)) {
            Some(function) => Ok(function.arn.clone()),
            None => Err(RemoteError::new(FUNCTION_NOT_FOUND, format!("Function not found: {name}"))),
        })
    }

    async fn create_function(&self, name: &str, spec: &FunctionSpec) -> Result<String, RemoteError> {
        self.enter("create_function")?;
        self.with_state(|state| {
            if state.functions.contains_key(name) {
                return Err(RemoteError::new("ResourceConflictException", "function exists"));
            }
            let arn = function_arn(name);
            state.functions.insert(
                name.to_string(),
                FakeFunction {
                    arn: arn.clone(),
                    role_arn: spec.role_arn.clone(),
                    code_versions: 1,
                },
            );
            Ok(arn)
        })
    }

    async fn update_function_code(&self, name: &str, _bundle: &[u8]) -> Result<(), RemoteError> {
        self.enter("update_function_code")?;
        self.with_state(|state| match state.functions.get_mut(function_key(name)) {
            Some(function) => {
                function.code_versions += 1;
                Ok(())
            }
            None => Err(RemoteError::new(FUNCTION_NOT_FOUND, "no such function")),
        })
    }

    async fn update_function_configuration(&self, name: &str, spec: &FunctionSpec) -> Result<(), RemoteError> {
        self.enter("update_function_configuration")?;
        self.with_state(|state| match state.functions.get_mut(function_key(name)) {
            Some(function) => {
                function.role_arn = spec.role_arn.clone();
                Ok(())
            }
            None => Err(RemoteError::new(FUNCTION_NOT_FOUND, "no such function")),
        })
    }

    async fn delete_function(&self, name: &str) -> Result<(), RemoteError> {
        self.enter("delete_function")?;
        self.with_state(|state| match state.functions.remove(function_key(name)) {
            Some(_) => Ok(()),
            None => Err(RemoteError::new(FUNCTION_NOT_FOUND, "no such function")),
        })
    }

    async fn add_permission(&self, grant: &PermissionGrant) -> Result<(), RemoteError> {
        self.enter("add_permission")?;
        self.with_state(|state| {
            let duplicate = state.grants.iter().any(|existing| {
                existing.function_name == grant.function_name && existing.statement_id == grant.statement_id
            });
            if duplicate {
                return Err(RemoteError::new("ResourceConflictException", "statement id already exists"));
            }
            state.grants.push(grant.clone());
            Ok(())
        })
    }

    async fn remove_permission(&self, function_name: &str, statement_id: &str) -> Result<(), RemoteError> {
        self.enter("remove_permission")?;
        self.with_state(|state| {
            let before = state.grants.len();
            state
                .grants
                .retain(|g| !(g.function_name == function_name && g.statement_id == statement_id));
            if state.grants.len() == before {
                Err(RemoteError::new(FUNCTION_NOT_FOUND, "statement not found"))
            } else {
                Ok(())
            }
        })
    }

    async fn invoke(&self, function_name: &str, payload: &[u8], mode: InvocationMode) -> Result<InvokeOutcome, RemoteError> {
        self.enter("invoke")?;
        self.with_state(|state| {
            state
                .invocations
                .push((function_name.to_string(), mode, payload.to_vec()));
            if state.failing_targets.contains(function_name) {
                return Err(RemoteError::new(FUNCTION_NOT_FOUND, format!("Function not found: {function_name}")));
            }
            Ok(match mode {
                InvocationMode::Event => InvokeOutcome {
                    status_code: 202,
                    ..InvokeOutcome::default()
                },
                InvocationMode::DryRun => InvokeOutcome {
                    status_code: 204,
                    ..InvokeOutcome::default()
                },
                InvocationMode::RequestResponse => InvokeOutcome {
                    status_code: 200,
                    payload: Some(br#"{"lambdaCount":3,"roleCount":5}"#.to_vec()),
                    function_error: None,
                },
            })
        })
    }
}

#[async_trait]
impl RuleApi for FakeCloud {
    async fn describe_rule(&self, name: &str) -> Result<String, RemoteError> {
        self.enter("describe_rule")?;
        self.with_state(|state| match state.rules.get(name) {
            Some(rule) => Ok(rule.arn.clone()),
            None => Err(RemoteError::new(RULE_NOT_FOUND, format!("Rule {name} does not exist."))),
        })
    }

    async fn put_rule(&self, name: &str, _schedule: &str) -> Result<String, RemoteError> {
        self.enter("put_rule")?;
        self.with_state(|state| {
            let rule = state.rules.entry(name.to_string()).or_insert_with(|| FakeRule {
                arn: rule_arn(name),
                targets: Vec::new(),
            });
            Ok(rule.arn.clone())
        })
    }

    async fn put_targets(&self, rule: &str, target_id: &str, _target_arn: &str, _input: &str) -> Result<(), RemoteError> {
        self.enter("put_targets")?;
        self.with_state(|state| match state.rules.get_mut(rule) {
            Some(rule) => {
                if !rule.targets.iter().any(|t| t == target_id) {
                    rule.targets.push(target_id.to_string());
                }
                Ok(())
            }
            None => Err(RemoteError::new(RULE_NOT_FOUND, "no such rule")),
        })
    }

    async fn remove_targets(&self, rule: &str, target_ids: &[String]) -> Result<(), RemoteError> {
        self.enter("remove_targets")?;
        self.with_state(|state| match state.rules.get_mut(rule) {
            Some(rule) => {
                rule.targets.retain(|t| !target_ids.contains(t));
                Ok(())
            }
            None => Err(RemoteError::new(RULE_NOT_FOUND, "no such rule")),
        })
    }

    async fn delete_rule(&self, name: &str) -> Result<(), RemoteError> {
        self.enter("delete_rule")?;
        self.with_state(|state| match state.rules.get(name) {
            Some(rule) if !rule.targets.is_empty() => Err(RemoteError::new(
                "ValidationException",
                "Rule can't be deleted since it has targets.",
            )),
            Some(_) => {
                state.rules.remove(name);
                Ok(())
            }
            None => Err(RemoteError::new(RULE_NOT_FOUND, "no such rule")),
        })
    }
}
