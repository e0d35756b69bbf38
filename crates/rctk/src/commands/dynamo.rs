//! 🗄️ `dynamo export` and `dynamo modify-batch`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use super::{Context, drain, read_json, select_values};
use crate::backends::FileSink;
use crate::backends::aws::dynamodb::{ItemUpdater, ScanListing};
use crate::batch::{BatchOptions, BatchReport, run_batch};
use crate::pagination::PaginationSummary;
use crate::progress::ProgressSink;
use crate::update_expression::{UpdateExpression, UpdateExpressionBuilder, flatten_patch};

/// 📤 Scan `table` into `file`, one JSON object per line.
pub async fn export(ctx: &Context, table: &str, file: PathBuf) -> Result<PaginationSummary> {
    info!("🗄️ exporting table {table} to {}", file.display());
    let mut listing = ScanListing::new(ctx.clients.dynamodb.clone(), table, ctx.retry.clone());
    let mut sink = ProgressSink::new(FileSink::create(&file).await?, ctx.progress(table));

    let summary = drain(&mut listing, &mut sink)
        .await
        .with_context(|| format!("💀 export of table {table} stopped"))?;
    info!(pages = summary.pages, items = summary.items, "✅ table {table} exported");
    Ok(summary)
}

/// 🧩 Flatten a JSON patch and turn it into one `SET` expression.
pub fn prepare_patch(patch: &Value) -> Result<UpdateExpression> {
    let expression: UpdateExpressionBuilder = flatten_patch(patch).into_iter().collect();
    expression
        .build()
        .context("💀 the patch has nothing to set, it must be a non-empty JSON object")
}

/// ✏️ Something that can apply the prepared patch to the item with a given key.
#[async_trait]
pub trait KeyUpdater: Send + Sync {
    async fn update(&self, key: &Value) -> Result<()>;
}

#[async_trait]
impl KeyUpdater for ItemUpdater {
    async fn update(&self, key: &Value) -> Result<()> {
        ItemUpdater::update(self, key).await?;
        Ok(())
    }
}

/// 🔑 Keys must be present. A source element without one is an input error, not something to skip.
pub fn keys_from(values: Vec<Value>) -> Result<Vec<Value>> {
    if let Some(index) = values.iter().position(Value::is_null) {
        bail!("💀 source element {index} has no key value");
    }
    Ok(values)
}

/// 🚀 Apply the patch to every key through the batch runner.
pub async fn apply_patch(
    updater: Arc<dyn KeyUpdater>,
    keys: Vec<Value>,
    options: BatchOptions,
) -> Result<BatchReport> {
    run_batch(keys, options, move |key| {
        let updater = Arc::clone(&updater);
        async move {
            debug!("✏️ patching {key}");
            updater
                .update(&key)
                .await
                .with_context(|| format!("💀 could not patch item {key}"))
        }
    })
    .await
}

pub struct ModifyBatchArgs {
    pub table: String,
    pub key: String,
    pub source: PathBuf,
    pub patch: PathBuf,
    pub map_source_attribute: Option<String>,
    pub continue_on_error: bool,
}

pub async fn modify_batch(ctx: &Context, args: ModifyBatchArgs) -> Result<BatchReport> {
    let keys = keys_from(select_values(
        read_json(&args.source).await?,
        args.map_source_attribute.as_deref(),
    )?)?;
    let expression = prepare_patch(&read_json(&args.patch).await?)?;
    debug!(expression = %expression.expression, keys = keys.len(), "🧩 patch prepared");

    let updater = ItemUpdater::new(
        ctx.clients.dynamodb.clone(),
        &args.table,
        &args.key,
        expression,
        ctx.retry.clone(),
    );
    let report = apply_patch(
        Arc::new(updater),
        keys,
        ctx.batch_options(!args.continue_on_error),
    )
    .await?;
    info!(succeeded = report.succeeded, failed = report.failed, "✅ table {} patched", args.table);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingUpdater {
        seen: Mutex<Vec<Value>>,
        reject: Option<Value>,
    }

    #[async_trait]
    impl KeyUpdater for RecordingUpdater {
        async fn update(&self, key: &Value) -> Result<()> {
            self.seen.lock().await.push(key.clone());
            if self.reject.as_ref() == Some(key) {
                bail!("ConditionalCheckFailedException: nope");
            }
            Ok(())
        }
    }

    #[test]
    fn the_one_where_a_nested_patch_becomes_one_set() -> Result<()> {
        let expression = prepare_patch(&json!({"status": "done", "meta": {"by": "ops"}}))?;
        assert_eq!(expression.expression, "SET #a_0 = :v_0, #a_1 = :v_1");
        assert_eq!(expression.names["#a_1"], "status");
        assert_eq!(expression.names["#a_0"], "meta.by");
        assert_eq!(expression.values[":v_0"], json!("ops"));

        assert!(prepare_patch(&json!({})).is_err());
        Ok(())
    }

    #[test]
    fn the_one_where_a_keyless_element_is_refused() {
        let err = keys_from(vec![json!("a"), Value::Null]).expect_err("second has no key");
        assert!(err.to_string().contains("element 1"));
    }

    #[tokio::test]
    async fn the_one_where_every_key_gets_patched_in_order() -> Result<()> {
        let updater = Arc::new(RecordingUpdater::default());
        let keys = vec![json!("a"), json!("b"), json!(3)];

        let report = apply_patch(updater.clone(), keys.clone(), BatchOptions::default()).await?;

        assert_eq!(report.succeeded, 3);
        assert_eq!(*updater.seen.lock().await, keys);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_first_failure_stops_the_batch() {
        let updater = Arc::new(RecordingUpdater {
            reject: Some(json!("b")),
            ..RecordingUpdater::default()
        });
        let options = BatchOptions {
            concurrency: 1,
            stop_on_error: true,
        };

        let err = apply_patch(updater.clone(), vec![json!("a"), json!("b"), json!("c")], options)
            .await
            .expect_err("b is rejected");

        assert!(format!("{err:#}").contains("ConditionalCheckFailedException"));
        assert!(!updater.seen.lock().await.contains(&json!("c")));
    }

    #[tokio::test]
    async fn the_one_where_failures_are_tallied_when_asked_to_continue() -> Result<()> {
        let updater = Arc::new(RecordingUpdater {
            reject: Some(json!("b")),
            ..RecordingUpdater::default()
        });

        let report = apply_patch(updater, vec![json!("a"), json!("b"), json!("c")], BatchOptions::default()).await?;

        assert_eq!((report.succeeded, report.failed), (2, 1));
        assert!(report.failures[0].1.contains("could not patch item \"b\""));
        Ok(())
    }
}
