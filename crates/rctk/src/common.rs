//! 📦 Common data structures — the building blocks of rctk
//!
//! 🎬 COLD OPEN — INT. CLOUD CONSOLE — 3:47 AM
//!
//! Somebody clicked "next page" four hundred times and then gave up.
//! We do not give up. We follow the cursor. The cursor is opaque, the
//! items are opaque, and we like it that way: nobody in this module ever
//! looks inside a payload. We just carry it. 🦆

use serde::Serialize;

/// 📄 One batch of items plus the breadcrumb to the next batch.
///
/// `next_cursor` is whatever the listing API handed back — a scan key, a log
/// token, a marker string. The only thing we ever do with it is compare it to
/// the previous one and hand it back on the next call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T, C> {
    pub items: Vec<T>,
    pub next_cursor: Option<C>,
}

impl<T, C> Page<T, C> {
    /// 🏗️ A page with more to come (or not, if `next_cursor` is `None`).
    pub fn new(items: Vec<T>, next_cursor: Option<C>) -> Self {
        Self { items, next_cursor }
    }

    /// 🏁 The final page. No breadcrumb. The trail ends here.
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// 🔍 Walks a dotted path (`payload.lambda.arn`, `items.0.id`) into a JSON value.
///
/// Array segments are plain indices. A missing segment yields `None`,
/// the caller decides whether that's fatal or just a skip.
pub fn pick_path<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            serde_json::Value::Object(map) => map.get(segment),
            serde_json::Value::Array(list) => {
                segment.parse::<usize>().ok().and_then(|i| list.get(i))
            }
            _ => None,
        })
}
