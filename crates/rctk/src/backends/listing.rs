use anyhow::Result;
use async_trait::async_trait;

use crate::common::Page;

/// 🚰 A paginated listing — one remote "list/scan/describe" call per page.
///
/// Implement this and you too can be the origin of someone else's export file.
///
/// # Contract 📜
/// - `fetch_page(None)` asks for the first page.
/// - `fetch_page(Some(cursor))` resumes from where the previous page left off.
/// - The returned `Page::next_cursor` is either `None` (done) or a token the
///   listing wants back next time. Some APIs echo the same token instead of
///   saying "done"; the paginator deals with that, not you.
/// - Errors come back as-is. The paginator does not wrap them, retry them or
///   apologise for them. Retrying is the listing's own business (see `RetryPolicy`).
#[async_trait]
pub trait Listing: Send {
    /// 📦 Whatever a page holds. Never inspected by the engine.
    type Item: Send + 'static;
    /// 🔖 Opaque continuation token. Equality is the only question we ever ask it.
    type Cursor: PartialEq + Clone + Send + Sync + std::fmt::Debug + 'static;

    async fn fetch_page(
        &mut self,
        cursor: Option<Self::Cursor>,
    ) -> Result<Page<Self::Item, Self::Cursor>>;
}
