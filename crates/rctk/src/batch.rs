//! 🎬 *[a JSON file with four thousand Lambda ARNs lands on the desk.]*
//! *[each one needs a poke. some of them are already dead.]*
//! *[the batch runner hires a few workers and hands out tickets.]*
//!
//! 🧵 Batch fan-out: items go into a bounded `async-channel`, `concurrency` workers
//! pull from it, and every result lands in one shared tally. Items never see each
//! other. The tally is the only thing they share.
//!
//! Two temperaments:
//! - `stop_on_error = true`: the first failure closes the queue, the workers finish
//!   whatever they're holding, and that failure is the batch's error.
//! - `stop_on_error = false`: failures are logged at `warn`, counted, and the batch
//!   carries on.
//!
//! 🦆 (the duck has no comment at this time)

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use async_channel::{Receiver, Sender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// 🏗️ A background worker, that does work. duh.
pub trait Worker {
    /// 🚀 Start the worker. Returns a JoinHandle because we trust
    /// but verify. Mostly verify.
    fn start(self) -> JoinHandle<Result<()>>;
}

/// ⚙️ How wide and how brave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// workers pulling from the queue; 0 is treated as 1
    pub concurrency: usize,
    pub stop_on_error: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            stop_on_error: false,
        }
    }
}

/// 📊 The tally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
    /// (item, error chain) for every failure that was skipped over
    pub failures: Vec<(String, String)>,
}

/// 👷 Pulls items off the queue until it's closed and empty, or until someone yells stop.
struct ItemWorker<T, F> {
    id: usize,
    rx: Receiver<T>,
    op: Arc<F>,
    tally: Arc<Mutex<BatchReport>>,
    halted: Arc<AtomicBool>,
    stop_on_error: bool,
}

impl<T, F, Fut> Worker for ItemWorker<T, F>
where
    T: Display + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn start(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            debug!(worker = self.id, "🧵 batch worker clocking in");
            while let Ok(item) = self.rx.recv().await {
                if self.halted.load(Ordering::SeqCst) {
                    break;
                }
                let label = item.to_string();
                trace!(worker = self.id, item = %label, "🎯 processing");
                match (self.op)(item).await {
                    Ok(()) => self.tally.lock().await.succeeded += 1,
                    Err(err) if self.stop_on_error => {
                        self.halted.store(true, Ordering::SeqCst);
                        self.rx.close();
                        self.tally.lock().await.failed += 1;
                        return Err(err.context(format!("batch stopped at {label}")));
                    }
                    Err(err) => {
                        warn!(item = %label, "⚠️ {err:#}");
                        let mut tally = self.tally.lock().await;
                        tally.failed += 1;
                        tally.failures.push((label, format!("{err:#}")));
                    }
                }
            }
            debug!(worker = self.id, "🏁 batch worker clocking out");
            Ok(())
        })
    }
}

/// 📬 Feeds the queue, then closes it so the workers know when to go home.
fn feed<T: Send + 'static>(items: Vec<T>, tx: Sender<T>) -> JoinHandle<()> {
    tokio::spawn(async move {
        for item in items {
            if tx.send(item).await.is_err() {
                // closed by a stop-on-error worker
                break;
            }
        }
        tx.close();
    })
}

/// 🚀 Run `op` over every item with bounded concurrency.
///
/// `concurrency = 1` processes items strictly in order.
pub async fn run_batch<T, F, Fut>(items: Vec<T>, options: BatchOptions, op: F) -> Result<BatchReport>
where
    T: Display + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let concurrency = options.concurrency.max(1);
    debug!(items = items.len(), concurrency, stop_on_error = options.stop_on_error, "🧵 starting batch");

    let (tx, rx) = async_channel::bounded(concurrency);
    let tally = Arc::new(Mutex::new(BatchReport::default()));
    let halted = Arc::new(AtomicBool::new(false));
    let op = Arc::new(op);

    let feeder = feed(items, tx);
    let workers: Vec<JoinHandle<Result<()>>> = (0..concurrency)
        .map(|id| {
            ItemWorker {
                id,
                rx: rx.clone(),
                op: Arc::clone(&op),
                tally: Arc::clone(&tally),
                halted: Arc::clone(&halted),
                stop_on_error: options.stop_on_error,
            }
            .start()
        })
        .collect();
    drop(rx);

    let mut first_error = None;
    for worker in workers {
        let outcome = worker.await.context("💀 a batch worker panicked")?;
        if let Err(err) = outcome
            && first_error.is_none()
        {
            first_error = Some(err);
        }
    }
    feeder.await.context("💀 the batch feeder panicked")?;

    if let Some(err) = first_error {
        return Err(err);
    }
    let report = tally.lock().await.clone();
    debug!(succeeded = report.succeeded, failed = report.failed, "✅ batch finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn the_one_where_everybody_gets_poked() -> Result<()> {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let report = run_batch(
            (1..=10).collect(),
            BatchOptions { concurrency: 3, stop_on_error: true },
            move |n: u32| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().expect("seen lock").push(n);
                    Ok(())
                }
            },
        )
        .await?;

        assert_eq!(report.succeeded, 10);
        assert_eq!(report.failed, 0);
        let mut seen = seen.lock().expect("seen lock").clone();
        seen.sort();
        assert_eq!(seen, (1..=10).collect::<Vec<_>>());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_failures_are_noted_and_life_goes_on() -> Result<()> {
        let report = run_batch(
            vec!["a", "boom", "b", "kaboom", "c"],
            BatchOptions { concurrency: 2, stop_on_error: false },
            |item: &'static str| async move {
                if item.contains("boom") {
                    Err(anyhow!("{item} exploded"))
                } else {
                    Ok(())
                }
            },
        )
        .await?;

        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed, 2);
        let mut failed: Vec<_> = report.failures.iter().map(|(item, _)| item.as_str()).collect();
        failed.sort();
        assert_eq!(failed, vec!["boom", "kaboom"]);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_first_failure_stops_the_line() {
        let processed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&processed);
        let err = run_batch(
            (1..=20).collect(),
            BatchOptions { concurrency: 1, stop_on_error: true },
            move |n: u32| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if n == 3 { Err(anyhow!("three is a crowd")) } else { Ok(()) }
                }
            },
        )
        .await
        .expect_err("item 3 fails");

        assert_eq!(processed.load(Ordering::SeqCst), 3);
        assert!(format!("{err:#}").contains("three is a crowd"));
        assert!(format!("{err:#}").contains("batch stopped at 3"));
    }

    #[tokio::test]
    async fn the_one_where_no_more_than_n_are_in_flight() -> Result<()> {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (now, max) = (Arc::clone(&in_flight), Arc::clone(&peak));

        run_batch(
            (0..24).collect(),
            BatchOptions { concurrency: 4, stop_on_error: true },
            move |_n: u32| {
                let (now, max) = (Arc::clone(&now), Arc::clone(&max));
                async move {
                    let current = now.fetch_add(1, Ordering::SeqCst) + 1;
                    max.fetch_max(current, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    now.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        )
        .await?;

        assert!(peak.load(Ordering::SeqCst) <= 4);
        assert!(peak.load(Ordering::SeqCst) >= 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_zero_workers_still_means_one() -> Result<()> {
        let report = run_batch(
            vec![1u8, 2],
            BatchOptions { concurrency: 0, stop_on_error: false },
            |_n: u8| async { Ok(()) },
        )
        .await?;
        assert_eq!(report.succeeded, 2);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_an_empty_batch_is_a_quiet_day() -> Result<()> {
        let report = run_batch(Vec::<u8>::new(), BatchOptions::default(), |_n| async { Ok(()) }).await?;
        assert_eq!(report, BatchReport::default());
        Ok(())
    }
}
