//! Batch Coalescer (spec §3, §4.2) — absorbs a burst of classified events
//! into one flush, instead of kicking off a rebuild per event.
//!
//! Grounded on `listener.py`'s debounce loop: every incoming item resets a
//! quiet-period timer; the batch only flushes once that timer elapses with
//! no new arrivals, or the process is asked to flush immediately (config
//! reload, shutdown). `tokio::time::interval`'s reset-on-event semantics
//! don't exist as a single primitive, so this is built on `sleep` raced
//! against the inbound channel via `tokio::select!`, the same shape as the
//! teacher's `engine_parallel.rs` work-stealing loop but event-driven
//! rather than thread-pool-driven.

use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

use crate::types::{RebuildData, DEFAULT_BATCH_TIMER};

/// Drains `incoming` into batches, flushing via `on_flush` once no new
/// item has arrived for `quiet_period`. Runs until `incoming` is closed.
pub async fn run<F, Fut>(
    mut incoming: mpsc::Receiver<RebuildData>,
    quiet_period: Duration,
    mut on_flush: F,
) where
    F: FnMut(Vec<RebuildData>) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut pending: Vec<RebuildData> = Vec::new();

    loop {
        if pending.is_empty() {
            match incoming.recv().await {
                Some(item) => pending.push(item),
                None => return,
            }
        } else {
            tokio::select! {
                item = incoming.recv() => {
                    match item {
                        Some(item) => pending.push(item),
                        None => {
                            on_flush(std::mem::take(&mut pending)).await;
                            return;
                        }
                    }
                }
                _ = sleep(quiet_period) => {
                    on_flush(std::mem::take(&mut pending)).await;
                }
            }
        }
    }
}

/// Default quiet period, overridable by config (spec §4.2).
pub fn default_quiet_period() -> Duration {
    DEFAULT_BATCH_TIMER
}
