//! 🎛️ Commands — where CLI arguments meet the core.
//!
//! Each handler builds a listing and a sink, or a set of managed resources, and
//! hands them to the paginator, the batch runner or the provisioner. The pieces
//! that decide something (what to invoke, which keys to patch, how streams fan
//! out) take traits, so the tests can drive them without an AWS account.
//!
//! 🦆 The duck does not take arguments. The duck takes breadcrumbs.

use std::path::Path;

use anyhow::{Context as _, Result, bail};
use serde_json::Value;
use tracing::debug;

use crate::app_config::AppConfig;
use crate::backends::Sink;
use crate::backends::aws::AwsClients;
use crate::backends::Listing;
use crate::batch::BatchOptions;
use crate::common::pick_path;
use crate::pagination::{PaginationSummary, paginate};
use crate::progress::ExportProgress;
use crate::retry::RetryPolicy;

pub mod cloudwatch;
pub mod dynamo;
pub mod lambda;
pub mod observer;
pub mod postgres;

/// 🧰 What every handler gets: the config, one client per service, and the retry policy.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: AppConfig,
    pub clients: AwsClients,
    pub retry: RetryPolicy,
    /// draw spinners on stderr
    pub show_progress: bool,
}

impl Context {
    /// 🔌 Build the clients from the config's `[aws]` section. The config is not touched afterwards.
    pub async fn connect(config: AppConfig, show_progress: bool) -> Self {
        let clients = AwsClients::connect(&config.aws).await;
        let retry = RetryPolicy::new(config.retry.clone());
        Self {
            config,
            clients,
            retry,
            show_progress,
        }
    }

    pub fn progress(&self, label: impl Into<String>) -> ExportProgress {
        if self.show_progress {
            ExportProgress::new(label)
        } else {
            ExportProgress::hidden(label)
        }
    }

    pub fn batch_options(&self, stop_on_error: bool) -> BatchOptions {
        BatchOptions {
            concurrency: self.config.runtime.batch_concurrency,
            stop_on_error,
        }
    }
}

/// 🚰 Paginate, then close the sink whether or not the walk made it to the end.
///
/// Pages that reached the sink before a failure get flushed; the walk's error wins
/// over a close error.
pub async fn drain<L, S>(listing: &mut L, sink: &mut S) -> Result<PaginationSummary>
where
    L: Listing + ?Sized,
    S: Sink<L::Item> + ?Sized,
{
    let walked = paginate(listing, sink).await;
    let closed = sink.close().await;
    let summary = walked?;
    closed?;
    Ok(summary)
}

/// 📖 A JSON input file, parsed. The error names the file.
pub async fn read_json(path: &Path) -> Result<Value> {
    debug!("📖 reading {}", path.display());
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("💀 could not read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("💀 {} is not valid JSON", path.display()))
}

/// 🎯 The elements of a JSON array source, optionally narrowed to one attribute each.
///
/// Elements without the attribute come back as `Null`; what that means is up to the caller.
pub fn select_values(source: Value, map_attribute: Option<&str>) -> Result<Vec<Value>> {
    let Value::Array(elements) = source else {
        bail!("💀 the source must be a JSON array");
    };
    Ok(match map_attribute {
        None => elements,
        Some(path) => elements
            .iter()
            .map(|element| pick_path(element, path).cloned().unwrap_or(Value::Null))
            .collect(),
    })
}
