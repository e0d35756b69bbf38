//! 📜 CloudWatch Logs: stream names of a group, and the events of one stream.
//!
//! `GetLogEvents` never runs out of forward tokens. At the end of a stream it hands
//! back the token you sent, with an empty page. The paginator treats that echo as the end.

use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_cloudwatchlogs::Client;
use chrono::{DateTime, SecondsFormat};

use super::remote_error;
use crate::backends::Listing;
use crate::common::Page;
use crate::retry::RetryPolicy;

/// 🗂️ The names of every log stream in a group.
#[derive(Debug, Clone)]
pub struct LogStreamListing {
    client: Client,
    group: String,
    retry: RetryPolicy,
}

impl LogStreamListing {
    pub fn new(client: Client, group: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            group: group.into(),
            retry,
        }
    }
}

#[async_trait]
impl Listing for LogStreamListing {
    type Item = String;
    type Cursor = String;

    async fn fetch_page(&mut self, cursor: Option<String>) -> Result<Page<String, String>> {
        let output = self
            .retry
            .run("DescribeLogStreams", || {
                let request = self
                    .client
                    .describe_log_streams()
                    .log_group_name(&self.group)
                    .set_next_token(cursor.clone());
                async move { request.send().await.map_err(remote_error) }
            })
            .await?;

        let names = output
            .log_streams()
            .iter()
            .filter_map(|stream| stream.log_stream_name().map(str::to_string))
            .collect();
        Ok(Page::new(names, output.next_token().map(str::to_string)))
    }
}

/// 📨 The events of one stream, oldest first, already rendered as lines.
#[derive(Debug, Clone)]
pub struct LogEventListing {
    client: Client,
    group: String,
    stream: String,
    retry: RetryPolicy,
}

impl LogEventListing {
    pub fn new(
        client: Client,
        group: impl Into<String>,
        stream: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            group: group.into(),
            stream: stream.into(),
            retry,
        }
    }
}

#[async_trait]
impl Listing for LogEventListing {
    type Item = String;
    type Cursor = String;

    async fn fetch_page(&mut self, cursor: Option<String>) -> Result<Page<String, String>> {
        let output = self
            .retry
            .run("GetLogEvents", || {
                let request = self
                    .client
                    .get_log_events()
                    .log_group_name(&self.group)
                    .log_stream_name(&self.stream)
                    .start_from_head(true)
                    .set_next_token(cursor.clone());
                async move { request.send().await.map_err(remote_error) }
            })
            .await?;

        let lines = output
            .events()
            .iter()
            .map(|event| format_event(event.timestamp().unwrap_or_default(), event.message().unwrap_or_default()))
            .collect();
        Ok(Page::new(lines, output.next_forward_token().map(str::to_string)))
    }
}

/// 🕰️ `<RFC3339 timestamp>: <message>`, milliseconds kept, UTC.
///
/// Out-of-range timestamps fall back to the raw millisecond count.
pub fn format_event(timestamp_ms: i64, message: &str) -> String {
    let stamp = DateTime::from_timestamp_millis(timestamp_ms)
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| timestamp_ms.to_string());
    format!("{stamp}: {message}")
}

/// The log group a Lambda function writes to.
pub fn function_log_group(function_name: &str) -> String {
    format!("/aws/lambda/{function_name}")
}
