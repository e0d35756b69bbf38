//! 🔄 The Paginator — follows the cursor until the cursor stops leading anywhere.
//!
//! 🎬 *[a listing API returns 1,000 items and a token.]*
//! *[the token leads to 1,000 more. and another token.]*
//! *[somewhere, a CloudWatch stream returns the SAME token it was given.]*
//! *[the paginator does not fall for it.]*
//!
//! 🧠 Knowledge graph:
//! - [`paginate`]: drive a [`Listing`] into a [`Sink`], strictly one page in flight.
//! - [`page_stream`] / [`item_stream`]: the same walk as a lazy `futures` stream,
//!   for callers that want to fold/count instead of writing somewhere.
//! - Termination: no cursor → done. Cursor equal to the one we just sent → done.
//!   Both rules always apply; which one a given API uses is its own business.
//! - Errors from the listing or the sink go straight to the caller. Pages already
//!   delivered stay delivered (partial export files are a feature, not a bug).
//!
//! 🦆 The duck follows breadcrumbs too. The duck also stops when they run out.

use anyhow::Result;
use futures::{Stream, TryStreamExt, stream};
use tracing::trace;

use crate::backends::{Listing, Sink};
use crate::common::Page;

/// 📊 What a finished walk looked like.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaginationSummary {
    /// 📄 pages fetched from the listing (including empty ones)
    pub pages: usize,
    /// 📦 items handed to the sink
    pub items: usize,
}

/// 🏁 Is the walk over after this fetch?
///
/// `requested` is the cursor we sent, `next` is what came back.
fn is_exhausted<C: PartialEq>(requested: Option<&C>, next: Option<&C>) -> bool {
    match (requested, next) {
        (_, None) => true,
        (Some(requested), Some(next)) => requested == next,
        (None, Some(_)) => false,
    }
}

/// 🚀 Walk `listing` from the first page to the last, feeding every page to `sink`.
///
/// One fetch, one `send`, repeat. `send` has to finish before the next fetch
/// starts, so at most one page is ever held in memory.
///
/// An empty page that also ends the walk is not passed to the sink: an empty
/// first page means zero `send` calls, and the empty echo page some log APIs
/// return at the end doesn't produce a pointless empty write.
///
/// The sink is not closed here. Whoever opened it closes it.
pub async fn paginate<L, S>(listing: &mut L, sink: &mut S) -> Result<PaginationSummary>
where
    L: Listing + ?Sized,
    S: Sink<L::Item> + ?Sized,
{
    let mut summary = PaginationSummary::default();
    let mut cursor: Option<L::Cursor> = None;

    loop {
        let Page { items, next_cursor } = listing.fetch_page(cursor.clone()).await?;
        summary.pages += 1;

        let exhausted = is_exhausted(cursor.as_ref(), next_cursor.as_ref());
        trace!(
            page = summary.pages,
            items = items.len(),
            exhausted,
            "📄 page fetched"
        );

        if !(items.is_empty() && exhausted) {
            summary.items += items.len();
            sink.send(items).await?;
        }

        if exhausted {
            return Ok(summary);
        }
        cursor = next_cursor;
    }
}

/// 🌊 The same walk as [`paginate`], as a lazy stream of pages.
///
/// Nothing is fetched until the stream is polled. Finite, and not restartable:
/// once a page has been pulled, it's gone. The terminal empty page rule applies
/// here too.
pub fn page_stream<L>(listing: L) -> impl Stream<Item = Result<Page<L::Item, L::Cursor>>>
where
    L: Listing,
{
    let state: (L, Option<L::Cursor>, bool) = (listing, None, false);
    stream::try_unfold(state, |(mut listing, cursor, done)| async move {
        if done {
            return Ok(None);
        }
        let page = listing.fetch_page(cursor.clone()).await?;
        let exhausted = is_exhausted(cursor.as_ref(), page.next_cursor.as_ref());
        let next_cursor = page.next_cursor.clone();
        Ok(Some(((page, exhausted), (listing, next_cursor, exhausted))))
    })
    .try_filter(|(page, exhausted)| futures::future::ready(!(page.items.is_empty() && *exhausted)))
    .map_ok(|(page, _)| page)
}

/// 🧮 Like [`page_stream`], flattened down to individual items.
pub fn item_stream<L>(listing: L) -> impl Stream<Item = Result<L::Item>>
where
    L: Listing,
{
    page_stream(listing)
        .map_ok(|page| stream::iter(page.items.into_iter().map(Ok::<_, anyhow::Error>)))
        .try_flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::in_mem::{InMemoryListing, InMemorySink};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn the_one_where_three_pages_land_in_the_buffer_in_order() -> Result<()> {
        let mut listing = InMemoryListing::new(vec![
            Page::new(vec!["a", "b"], Some(1)),
            Page::new(vec!["c", "d"], Some(2)),
            Page::last(vec!["e"]),
        ]);
        let sink = InMemorySink::new();
        let mut handle = sink.clone();

        let summary = paginate(&mut listing, &mut handle).await?;

        assert_eq!(sink.items().await, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(sink.pages().await.len(), 3);
        assert_eq!(summary, PaginationSummary { pages: 3, items: 5 });
        assert_eq!(listing.requested_cursors(), vec![None, Some(1), Some(2)]);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_n_pages_mean_exactly_n_sends() -> Result<()> {
        for n in 1..=6usize {
            let pages = (0..n)
                .map(|i| {
                    let cursor = if i + 1 == n { None } else { Some(i) };
                    Page::new(vec![i], cursor)
                })
                .collect();
            let mut listing = InMemoryListing::new(pages);
            let sink = InMemorySink::new();
            let mut handle = sink.clone();

            paginate(&mut listing, &mut handle).await?;

            assert_eq!(sink.pages().await.len(), n);
            assert_eq!(sink.items().await, (0..n).collect::<Vec<_>>());
            assert_eq!(listing.calls(), n);
        }
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_cursor_echoes_and_nobody_loops_forever() -> Result<()> {
        // 🔁 first call hands out "tok", second call echoes "tok" back: done.
        // a third call would hit the end of the script and blow up.
        let mut listing = InMemoryListing::new(vec![
            Page::new(vec![1], Some("tok".to_string())),
            Page::new(vec![2], Some("tok".to_string())),
        ]);
        let sink = InMemorySink::new();
        let mut handle = sink.clone();

        let summary = paginate(&mut listing, &mut handle).await?;

        assert_eq!(summary.pages, 2);
        assert_eq!(listing.calls(), 2);
        assert_eq!(sink.items().await, vec![1, 2]);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_first_page_is_an_empty_room() -> Result<()> {
        let mut listing = InMemoryListing::<u8, u8>::new(vec![Page::last(vec![])]);
        let sink = InMemorySink::new();
        let mut handle = sink.clone();

        let summary = paginate(&mut listing, &mut handle).await?;

        assert_eq!(summary, PaginationSummary { pages: 1, items: 0 });
        assert!(sink.pages().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_fetch_error_keeps_what_was_already_written() {
        let mut listing = InMemoryListing::new(vec![Page::new(vec![1, 2], Some(7))])
            .then_fail("throttled into oblivion");
        let sink = InMemorySink::new();
        let mut handle = sink.clone();

        let err = paginate(&mut listing, &mut handle)
            .await
            .expect_err("second fetch must fail");

        assert_eq!(err.to_string(), "throttled into oblivion");
        assert_eq!(sink.items().await, vec![1, 2]);
    }

    /// 🐢 a sink that takes its sweet time and tattles if it's ever called while busy
    struct SlowSink {
        busy: Arc<AtomicBool>,
        overlaps: Arc<AtomicUsize>,
        order: Arc<std::sync::Mutex<Vec<u32>>>,
    }

    #[async_trait]
    impl Sink<u32> for SlowSink {
        async fn send(&mut self, items: Vec<u32>) -> Result<()> {
            if self.busy.swap(true, Ordering::SeqCst) {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            if let Ok(mut order) = self.order.lock() {
                order.extend(items);
            }
            self.busy.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    /// 🕵️ a listing that notes whether the sink was mid-write when it got called
    struct NosyListing {
        remaining: Vec<Page<u32, u32>>,
        busy: Arc<AtomicBool>,
        fetched_while_busy: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Listing for NosyListing {
        type Item = u32;
        type Cursor = u32;

        async fn fetch_page(&mut self, _cursor: Option<u32>) -> Result<Page<u32, u32>> {
            if self.busy.load(Ordering::SeqCst) {
                self.fetched_while_busy.fetch_add(1, Ordering::SeqCst);
            }
            Ok(self.remaining.remove(0))
        }
    }

    #[tokio::test]
    async fn the_one_where_page_k_plus_one_waits_for_page_k() -> Result<()> {
        let busy = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let fetched_while_busy = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut listing = NosyListing {
            remaining: vec![
                Page::new(vec![1], Some(1)),
                Page::new(vec![2], Some(2)),
                Page::new(vec![3], Some(3)),
                Page::last(vec![4]),
            ],
            busy: Arc::clone(&busy),
            fetched_while_busy: Arc::clone(&fetched_while_busy),
        };
        let mut sink = SlowSink {
            busy,
            overlaps: Arc::clone(&overlaps),
            order: Arc::clone(&order),
        };

        paginate(&mut listing, &mut sink).await?;

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert_eq!(fetched_while_busy.load(Ordering::SeqCst), 0);
        assert_eq!(*order.lock().expect("order lock"), vec![1, 2, 3, 4]);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_stream_counts_lazily_and_stops_on_echo() -> Result<()> {
        let listing = InMemoryListing::new(vec![
            Page::new(vec!["x", "y"], Some("m1")),
            Page::new(vec!["z"], Some("m2")),
            Page::new(vec![], Some("m2")),
        ]);

        let items: Vec<_> = item_stream(listing).try_collect().await?;
        assert_eq!(items, vec!["x", "y", "z"]);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_stream_skips_the_empty_first_page() -> Result<()> {
        let listing = InMemoryListing::<u8, u8>::new(vec![Page::last(vec![])]);
        let pages: Vec<_> = page_stream(listing).try_collect().await?;
        assert!(pages.is_empty());
        Ok(())
    }

    #[test]
    fn the_one_where_both_termination_rules_are_checked() {
        assert!(is_exhausted::<u8>(None, None));
        assert!(!is_exhausted(None, Some(&1)));
        assert!(is_exhausted(Some(&1), Some(&1)));
        assert!(!is_exhausted(Some(&1), Some(&2)));
        assert!(is_exhausted(Some(&1), None));
    }
}
