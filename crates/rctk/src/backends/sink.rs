use anyhow::Result;
use async_trait::async_trait;

/// 🕳️ A sink that durably records pages of items — pure I/O, zero pagination logic.
///
/// The yin to the listing's yang. The drain at the bottom of the export tub.
///
/// # Contract 📜
/// - `send` takes ownership of one page worth of items and records them. It is
///   called sequentially, in page order, never concurrently. The next page is not
///   fetched until `send` has returned, so a slow sink slows the whole export
///   (that's the backpressure, and that's the point).
/// - `close` flushes, finalizes, and bids the data a fond farewell. MUST be called
///   by whoever created the sink. The paginator never calls it.
#[async_trait]
pub trait Sink<T: Send + 'static>: Send {
    /// 📡 Record one page of items. Append-only.
    async fn send(&mut self, items: Vec<T>) -> Result<()>;
    /// 🗑️ Flush and release. Call this. Always. No exceptions. Not even on Fridays.
    async fn close(&mut self) -> Result<()>;
}
