//! 📊 progress.rs — "Are we there yet?" — every export, every time, forever.
//!
//! 🚀 This module answers the age-old question: "how fast are the pages coming in?"
//! With cold hard numbers, a spinner, and a table so comfy it has lumbar support.
//!
//! Listings don't tell us how many pages are left, so there's no bar and no ETA.
//! Just a spinner, the running totals, and a rate over the last few seconds.
//!
//! ⚠️  Warning: Watching this spinner will not make DynamoDB scan faster.
//! Neither will refreshing it. We've tried. Science says no.
//!
//! 🦆 The duck has nothing to do with this module. It's just vibing.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};

use crate::backends::Sink;

/// 🔢 Formats a number with commas for the 3 people in the audience who like readability.
/// "1000000 items" → "1,000,000 items" — you're welcome, eyes.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ Formats a Duration into MM:SS or HH:MM:SS.
/// If it shows HH:MM:SS, you should probably call your mom. It's been a while.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 📊 Running totals of an export, drawn as a spinner plus a little table on stderr.
///
/// Uses a sliding 5-second window for the rate so one slow page doesn't
/// make the number look like a seismograph.
pub struct ExportProgress {
    /// 🏷️ what are we exporting? a table name, a log group
    label: String,
    pages: u64,
    items: u64,
    progress_bar: ProgressBar,
    /// 🔄 sliding window of (timestamp, items)
    rate_samples: VecDeque<(Instant, u64)>,
    start_time: Instant,
}

impl std::fmt::Debug for ExportProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 custom Debug impl because ProgressBar is a diva and doesn't derive Debug
        f.debug_struct("ExportProgress")
            .field("label", &self.label)
            .field("pages", &self.pages)
            .field("items", &self.items)
            .finish()
    }
}

impl ExportProgress {
    /// 🚀 A visible spinner on stderr.
    pub fn new(label: impl Into<String>) -> Self {
        let progress_bar = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        progress_bar.set_style(style);
        progress_bar.enable_steady_tick(Duration::from_millis(120));
        Self::with_bar(label.into(), progress_bar)
    }

    /// 🙈 Same bookkeeping, nothing drawn. For `--verbosity silent` and tests.
    pub fn hidden(label: impl Into<String>) -> Self {
        Self::with_bar(label.into(), ProgressBar::hidden())
    }

    fn with_bar(label: String, progress_bar: ProgressBar) -> Self {
        let start_time = Instant::now();
        let mut rate_samples = VecDeque::new();
        // -- 🔄 seed the rate window with t=0 so we don't divide by zero like animals
        rate_samples.push_back((start_time, 0u64));
        Self {
            label,
            pages: 0,
            items: 0,
            progress_bar,
            rate_samples,
            start_time,
        }
    }

    pub fn pages(&self) -> u64 {
        self.pages
    }

    pub fn items(&self) -> u64 {
        self.items
    }

    /// 🔄 One more page of `items` items made it to the sink.
    pub fn record_page(&mut self, items: u64) {
        self.pages += 1;
        self.items += items;
        let rate = self.items_per_sec();
        self.render(rate);
    }

    /// ✅ Leave the final totals on screen.
    pub fn finish(&self) {
        self.progress_bar.finish();
    }

    fn items_per_sec(&mut self) -> f64 {
        let now = Instant::now();
        let window = Duration::from_secs(5);
        while let Some(&(timestamp, _)) = self.rate_samples.front() {
            if now.duration_since(timestamp) > window {
                self.rate_samples.pop_front();
            } else {
                break;
            }
        }
        self.rate_samples.push_back((now, self.items));

        if let Some(&(oldest_time, oldest_items)) = self.rate_samples.front() {
            let elapsed = now.duration_since(oldest_time).as_secs_f64();
            if elapsed > 0.0 {
                return self.items.saturating_sub(oldest_items) as f64 / elapsed;
            }
        }
        // -- 💤 not enough elapsed time yet, zeros and composure
        0.0
    }

    /// 🎨 Layout (2 rows x 2 cols) under an `export: <label>` line.
    fn render(&self, items_per_sec: f64) {
        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec![
            Cell::new(format!("{} items/s", format_number(items_per_sec as u64)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} items", format_number(self.items)))
                .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} elapsed", format_duration(self.start_time.elapsed())))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} pages", format_number(self.pages)))
                .set_alignment(CellAlignment::Right),
        ]);
        self.progress_bar
            .set_message(format!("export: {}\n{}", self.label, table));
    }
}

/// 🪞 Wraps a sink and ticks an [`ExportProgress`] after every page it accepts.
///
/// Items pass through untouched. `close` closes the inner sink and finishes the spinner.
#[derive(Debug)]
pub struct ProgressSink<S> {
    inner: S,
    progress: ExportProgress,
}

impl<S> ProgressSink<S> {
    pub fn new(inner: S, progress: ExportProgress) -> Self {
        Self { inner, progress }
    }

    pub fn progress(&self) -> &ExportProgress {
        &self.progress
    }
}

#[async_trait]
impl<T, S> Sink<T> for ProgressSink<S>
where
    T: Send + 'static,
    S: Sink<T>,
{
    async fn send(&mut self, items: Vec<T>) -> Result<()> {
        let count = items.len() as u64;
        self.inner.send(items).await?;
        self.progress.record_page(count);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await?;
        self.progress.finish();
        Ok(())
    }
}
