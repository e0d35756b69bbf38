//! 🐘 `postgres export-deployment` (a.k.a. `exp-dep`): one deployment's lifecycle rows as JSON.

use std::path::PathBuf;

use anyhow::{Context as _, Result, anyhow};
use chrono::{SecondsFormat, Utc};
use serde_json::{Value, json};
use tracing::{debug, info, trace};

use super::Context;
use crate::backends::aws::rds::DataApiExecutor;
use crate::sql::{
    COMMANDS_TABLE, STATE_TABLE, StatementExecutor, deployment_version, lifecycle_database,
    parse_embedded_json, select_by_deployment,
};

/// 📦 `{date, state, commands}` for one deployment.
///
/// `state` is the first state row with its `state` column parsed; every command
/// row gets its `command` column parsed.
pub async fn collect_deployment(
    executor: &dyn StatementExecutor,
    deployment: &str,
    date: &str,
) -> Result<Value> {
    let version = deployment_version(deployment)?;
    let database = lifecycle_database(version);
    debug!("🐘 deployment {deployment} lives in {database}");

    let mut states = executor
        .execute(&select_by_deployment(&database, STATE_TABLE, deployment))
        .await?
        .into_objects()?;
    trace!(rows = states.len(), "🐘 state rows");
    if states.is_empty() {
        return Err(anyhow!("💀 no state found for deployment {deployment} in {database}"));
    }
    let mut state = states.swap_remove(0);
    parse_embedded_json(&mut state, "state")?;

    let mut commands = executor
        .execute(&select_by_deployment(&database, COMMANDS_TABLE, deployment))
        .await?
        .into_objects()?;
    trace!(rows = commands.len(), "🐘 command rows");
    for command in &mut commands {
        parse_embedded_json(command, "command")?;
    }

    Ok(json!({
        "date": date,
        "state": state,
        "commands": commands,
    }))
}

pub struct ExportDeploymentArgs {
    pub deployment: String,
    pub file: PathBuf,
    pub cluster_arn: String,
    pub secret_arn: String,
}

pub async fn export_deployment(ctx: &Context, args: ExportDeploymentArgs) -> Result<()> {
    let executor = DataApiExecutor::new(
        ctx.clients.rds.clone(),
        &args.cluster_arn,
        &args.secret_arn,
        ctx.retry.clone(),
    );
    let date = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let export = collect_deployment(&executor, &args.deployment, &date)
        .await
        .with_context(|| format!("💀 could not export deployment {}", args.deployment))?;

    debug!("📝 writing {}", args.file.display());
    let mut rendered = serde_json::to_string_pretty(&export)?;
    rendered.push('\n');
    tokio::fs::write(&args.file, rendered)
        .await
        .with_context(|| format!("💀 could not write {}", args.file.display()))?;
    info!("✅ deployment {} exported to {}", args.deployment, args.file.display());
    Ok(())
}
