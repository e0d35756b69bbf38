//! 📂 Previously, on "Things That Could Go Wrong With A File"...
//!
//! The export had been running for forty minutes. Then the credentials expired.
//! The file on disk stopped mid-sentence, like a novelist who got a better offer.
//!
//! That's expected. An aborted export leaves a partial file behind, every page
//! that made it through `send` is in there, nothing after. We don't roll back.
//! We don't pretend. The file is as honest as the last successful page.
//!
//! 🚰 Listing → Page → FileSink → BufWriter → disk (or stdout, for the brave)
//! 🦆 (mandatory, no notes)

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::{
    fs::File,
    io::{self, AsyncWrite, AsyncWriteExt},
};
use tracing::trace;

use crate::backends::Sink;

/// 📝 Anything that knows how to become exactly one line of output.
///
/// No trailing newline please, the sink adds it. One item, one line,
/// one less thing to argue about in code review.
pub trait Record {
    fn render_line(&self) -> Result<String>;
}

impl Record for serde_json::Value {
    fn render_line(&self) -> Result<String> {
        serde_json::to_string(self).context("💀 a JSON value refused to be serialized back into JSON")
    }
}

impl Record for String {
    fn render_line(&self) -> Result<String> {
        Ok(self.clone())
    }
}

/// 🎯 Where the bytes end up. A path for the record books, or stdout for the pipe enthusiasts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    File(PathBuf),
    Stdout,
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::File(path) => write!(f, "{}", path.display()),
            Destination::Stdout => write!(f, "<stdout>"),
        }
    }
}

/// 🚰 FileSink — receives pages of records and writes them line by line. I/O only.
///
/// It's a BufWriter around a tokio writer. Simple. Honest. Does not complain.
/// Does not retry. Does not have opinions about your data format.
///
/// ⚠️ `File::create` truncates if the file exists. No warning. No backup. Just gone.
pub struct FileSink {
    writer: io::BufWriter<Box<dyn AsyncWrite + Send + Unpin>>,
    destination: Destination,
    lines_written: u64,
}

// 🎭 manual Debug impl because a boxed AsyncWrite is a diva that doesn't derive Debug
impl std::fmt::Debug for FileSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSink")
            .field("destination", &self.destination)
            .field("lines_written", &self.lines_written)
            .finish()
    }
}

impl FileSink {
    /// 🚀 Creates (or obliterates and recreates) the output file.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file_handle = File::create(path).await.with_context(|| {
            format!(
                "💀 The output file '{}' could not be conjured into existence. \
                 We stared at the path. The path stared back. \
                 One of us was wrong about whether the parent directory existed.",
                path.display()
            )
        })?;
        Ok(Self::from_writer(
            Box::new(file_handle),
            Destination::File(path.to_path_buf()),
        ))
    }

    /// 📺 Stream straight to stdout. Pipe it into `jq`, `grep`, or the void.
    pub fn stdout() -> Self {
        Self::from_writer(Box::new(io::stdout()), Destination::Stdout)
    }

    /// 🎯 Opens whichever destination you asked for.
    pub async fn open(destination: &Destination) -> Result<Self> {
        match destination {
            Destination::File(path) => Self::create(path).await,
            Destination::Stdout => Ok(Self::stdout()),
        }
    }

    fn from_writer(writer: Box<dyn AsyncWrite + Send + Unpin>, destination: Destination) -> Self {
        Self {
            writer: io::BufWriter::new(writer),
            destination,
            lines_written: 0,
        }
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    /// 🗑️ Flush the BufWriter. Same thing `Sink::close` does, minus the turbofish
    /// (this sink speaks many item types, so the trait call needs a hint).
    pub async fn finish(&mut self) -> Result<()> {
        trace!("🎬 final flush for {}, {} lines", self.destination, self.lines_written);
        self.writer.flush().await.with_context(|| {
            format!(
                "💀 Error flushing {} — the bytes were SO CLOSE to the disk. They could see it.",
                self.destination
            )
        })
    }
}

#[async_trait]
impl<T> Sink<T> for FileSink
where
    T: Record + Send + 'static,
{
    async fn send(&mut self, items: Vec<T>) -> Result<()> {
        trace!(
            "📬 {} records walked into the file sink for {}",
            items.len(),
            self.destination
        );
        for item in items {
            let mut line = item.render_line()?;
            if !line.ends_with('\n') {
                line.push('\n');
            }
            self.writer.write_all(line.as_bytes()).await?;
            self.lines_written += 1;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.finish().await
    }
}
