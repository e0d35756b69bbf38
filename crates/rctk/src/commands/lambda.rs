//! ⚡ `lambda invoke-batch`: one event, many functions, fire and forget.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use serde_json::Value;
use tracing::{debug, info, trace};

use super::{Context, read_json, select_values};
use crate::backends::aws::lambda::LambdaFunctions;
use crate::batch::{BatchOptions, BatchReport, run_batch};
use crate::provisioning::{FunctionApi, InvocationMode};
use crate::retry::RetryPolicy;

/// 🎯 Only non-empty strings are function names. Everything else is quietly dropped.
pub fn select_targets(values: Vec<Value>) -> Vec<String> {
    values
        .into_iter()
        .filter_map(|value| match value {
            Value::String(arn) if !arn.is_empty() => Some(arn),
            _ => None,
        })
        .collect()
}

/// 📨 The event as bytes. `null`, `{}`, `[]` and `""` are refused.
pub fn event_payload(event: &Value) -> Result<Vec<u8>> {
    let empty = match event {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(text) => text.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    };
    if empty {
        bail!("💀 bad lambda event input, the event must not be empty");
    }
    Ok(serde_json::to_vec(event)?)
}

/// 🚀 Invoke every target with the same payload, through the batch runner.
pub async fn invoke_all(
    functions: Arc<dyn FunctionApi>,
    retry: RetryPolicy,
    targets: Vec<String>,
    payload: Vec<u8>,
    dry_run: bool,
    options: BatchOptions,
) -> Result<BatchReport> {
    let mode = if dry_run {
        InvocationMode::DryRun
    } else {
        InvocationMode::Event
    };
    let payload: Arc<[u8]> = payload.into();

    run_batch(targets, options, move |arn| {
        let functions = Arc::clone(&functions);
        let retry = retry.clone();
        let payload = Arc::clone(&payload);
        async move {
            trace!("⚡ {mode:?} invocation of {arn}");
            let outcome = retry
                .run("Invoke", || functions.invoke(&arn, &payload, mode))
                .await
                .with_context(|| format!("💀 invocation of {arn} failed"))?;
            debug!(status = outcome.status_code, "⚡ {arn} invoked");
            Ok(())
        }
    })
    .await
}

pub struct InvokeBatchArgs {
    pub source: PathBuf,
    pub event: PathBuf,
    pub map_source_attribute: Option<String>,
    pub stop_on_error: bool,
    pub dry_run: bool,
}

pub async fn invoke_batch(ctx: &Context, args: InvokeBatchArgs) -> Result<BatchReport> {
    let targets = select_targets(select_values(
        read_json(&args.source).await?,
        args.map_source_attribute.as_deref(),
    )?);
    let payload = event_payload(&read_json(&args.event).await?)?;
    info!("⚡ {} functions to invoke", targets.len());

    let functions = Arc::new(LambdaFunctions::new(ctx.clients.lambda.clone()));
    let report = invoke_all(
        functions,
        ctx.retry.clone(),
        targets,
        payload,
        args.dry_run,
        ctx.batch_options(args.stop_on_error),
    )
    .await?;
    info!(succeeded = report.succeeded, failed = report.failed, "✅ invocations finished");
    Ok(report)
}
