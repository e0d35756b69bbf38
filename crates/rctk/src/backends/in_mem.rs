//! # Previously, on rctk...
//!
//! 🎬 The cloud was unreachable. The credentials were expired. The intern had
//! deleted the test account "to save money". And still, the tests had to run.
//!
//! `in_mem` provides a scripted [`Listing`] and a hoarding [`Sink`] that live
//! entirely in RAM. The [`InMemoryListing`] hands out pre-baked pages in order
//! and writes down every cursor it was asked for, so tests can check that the
//! paginator followed the breadcrumbs. The [`InMemorySink`] keeps every page
//! it receives behind an `Arc<Mutex<...>>` so callers can inspect what arrived.
//!
//! 🦆
//!
//! ✅ No network calls. No disk I/O. No AWS bill. Just vibes and heap memory.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::backends::{Listing, Sink};
use crate::common::Page;

/// 📜 A listing that reads its lines from a script.
///
/// Every `fetch_page` pops the next scripted page, no matter which cursor it was
/// handed. The cursor is written down in `requested` so the test can verify the
/// conversation afterwards. Asking past the end of the script is an error: a
/// paginator that does that has a termination bug, and we want to hear about it.
#[derive(Debug)]
pub struct InMemoryListing<T, C> {
    script: VecDeque<Result<Page<T, C>, String>>,
    requested: Arc<std::sync::Mutex<Vec<Option<C>>>>,
}

impl<T, C> InMemoryListing<T, C>
where
    C: Clone,
{
    /// 🚀 A listing that will serve exactly these pages, in this order.
    pub fn new(pages: Vec<Page<T, C>>) -> Self {
        Self {
            script: pages.into_iter().map(Ok).collect(),
            requested: Arc::default(),
        }
    }

    /// 💀 Append a failure to the script. The call that reaches it gets an error.
    pub fn then_fail(mut self, message: impl Into<String>) -> Self {
        self.script.push_back(Err(message.into()));
        self
    }

    /// 🔍 Every cursor the paginator asked for, in call order.
    pub fn requested_cursors(&self) -> Vec<Option<C>> {
        self.requested
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// 🔢 How many times `fetch_page` was called.
    pub fn calls(&self) -> usize {
        self.requested.lock().map(|guard| guard.len()).unwrap_or(0)
    }
}

#[async_trait]
impl<T, C> Listing for InMemoryListing<T, C>
where
    T: Send + 'static,
    C: PartialEq + Clone + Send + Sync + std::fmt::Debug + 'static,
{
    type Item = T;
    type Cursor = C;

    async fn fetch_page(&mut self, cursor: Option<C>) -> Result<Page<T, C>> {
        if let Ok(mut requested) = self.requested.lock() {
            requested.push(cursor);
        }
        match self.script.pop_front() {
            Some(Ok(page)) => Ok(page),
            Some(Err(message)) => bail!(message),
            None => bail!("💀 in-memory listing ran out of script, somebody kept asking for more pages"),
        }
    }
}

/// 📦 A sink that never forgets. Each entry is one page, exactly as delivered.
///
/// Clone-able because tests need to peek inside after handing the sink off.
/// The `Arc` means every clone shares the same evidence locker.
#[derive(Debug)]
pub struct InMemorySink<T> {
    pub received: Arc<Mutex<Vec<Vec<T>>>>,
    pub closed: Arc<Mutex<bool>>,
}

impl<T> Clone for InMemorySink<T> {
    fn clone(&self) -> Self {
        Self {
            received: Arc::clone(&self.received),
            closed: Arc::clone(&self.closed),
        }
    }
}

impl<T> Default for InMemorySink<T> {
    fn default() -> Self {
        Self {
            received: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(Mutex::new(false)),
        }
    }
}

impl<T: Clone> InMemorySink<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 📚 Pages as they arrived.
    pub async fn pages(&self) -> Vec<Vec<T>> {
        self.received.lock().await.clone()
    }

    /// 🧮 All items, flattened, in arrival order.
    pub async fn items(&self) -> Vec<T> {
        self.received.lock().await.iter().flatten().cloned().collect()
    }

    pub async fn is_closed(&self) -> bool {
        *self.closed.lock().await
    }
}

#[async_trait]
impl<T> Sink<T> for InMemorySink<T>
where
    T: Send + 'static,
{
    async fn send(&mut self, items: Vec<T>) -> Result<()> {
        // 🔒 The Mutex is load-bearing. Do not remove. I know it looks optional. It isn't.
        self.received.lock().await.push(items);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        *self.closed.lock().await = true;
        Ok(())
    }
}
