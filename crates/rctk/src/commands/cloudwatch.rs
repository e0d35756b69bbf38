//! 📜 `cloudwatch export`: every stream of a log group, every event of every stream.
//!
//! Two paginations, nested. The outer one walks the stream names of the group; its
//! sink is a [`StreamEventsSink`], which runs a full inner pagination over each
//! stream's events into the real output sink. Still one page in flight at a time.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use super::Context;
use crate::backends::aws::cloudwatch::{LogEventListing, LogStreamListing};
use crate::backends::{Destination, FileSink, Listing, Sink};
use crate::pagination::{PaginationSummary, paginate};
use crate::progress::ProgressSink;

/// 🪆 A sink of stream names that exports each named stream into `inner`.
pub struct StreamEventsSink<F, S> {
    open_stream: F,
    inner: S,
    streams: usize,
    events: PaginationSummary,
}

impl<F, E, S> StreamEventsSink<F, S>
where
    F: FnMut(&str) -> E + Send,
    E: Listing<Item = String>,
    S: Sink<String>,
{
    pub fn new(open_stream: F, inner: S) -> Self {
        Self {
            open_stream,
            inner,
            streams: 0,
            events: PaginationSummary::default(),
        }
    }
}

impl<F, S> StreamEventsSink<F, S> {
    /// Streams exported so far.
    pub fn streams(&self) -> usize {
        self.streams
    }

    /// Event pages and lines written so far, across all streams.
    pub fn events(&self) -> PaginationSummary {
        self.events
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[async_trait]
impl<F, E, S> Sink<String> for StreamEventsSink<F, S>
where
    F: FnMut(&str) -> E + Send,
    E: Listing<Item = String>,
    S: Sink<String>,
{
    async fn send(&mut self, stream_names: Vec<String>) -> Result<()> {
        for stream in stream_names {
            debug!("📜 exporting stream {stream}");
            let mut events = (self.open_stream)(&stream);
            let summary = paginate(&mut events, &mut self.inner)
                .await
                .with_context(|| format!("💀 export of stream {stream} stopped"))?;
            self.streams += 1;
            self.events.pages += summary.pages;
            self.events.items += summary.items;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await
    }
}

/// 📤 Export a whole log group, or fail on the first broken stream.
///
/// Returns the number of streams and the event totals.
pub async fn export_group(
    ctx: &Context,
    group: &str,
    destination: &Destination,
) -> Result<(usize, PaginationSummary)> {
    info!("📜 exporting log group {group} to {destination}");
    let client = ctx.clients.logs.clone();
    let retry = ctx.retry.clone();
    let events_group = group.to_string();
    let output = ProgressSink::new(FileSink::open(destination).await?, ctx.progress(group));

    let mut streams = LogStreamListing::new(ctx.clients.logs.clone(), group, ctx.retry.clone());
    let mut sink = StreamEventsSink::new(
        move |stream: &str| LogEventListing::new(client.clone(), events_group.clone(), stream, retry.clone()),
        output,
    );

    let walked = paginate(&mut streams, &mut sink).await;
    let closed = sink.close().await;
    walked.with_context(|| format!("💀 export of log group {group} stopped"))?;
    closed?;

    info!(streams = sink.streams(), events = sink.events().items, "✅ log group {group} exported");
    Ok((sink.streams(), sink.events()))
}

pub async fn export(ctx: &Context, group: &str, file: PathBuf) -> Result<(usize, PaginationSummary)> {
    export_group(ctx, group, &Destination::File(file)).await
}
