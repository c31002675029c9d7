//! Awaited-Repo Registry (spec §3, §4.6) — a tag -> waiter rendezvous so
//! the orchestrator can block on "repo regenerated for tag X" without
//! polling.
//!
//! Grounded on `kojihelpers.py`'s `wait_repo`, which blocks a thread on a
//! condition variable until a matching `repo_done` bus message arrives or
//! a timeout elapses. Rust gets the same rendezvous for free from
//! `tokio::sync::oneshot` plus `tokio::time::timeout`, so there's no need
//! to hand-roll the condvar/polling loop the original does.

use std::collections::HashMap;

use tokio::sync::{oneshot, Mutex};
use tokio::time::timeout;

use crate::error::DaemonError;
use crate::types::WAIT_REPO_TIMEOUT;

/// Pending waiters for repos that haven't regenerated yet, keyed by tag.
pub struct AwaitedRepoRegistry {
    waiters: Mutex<HashMap<String, Vec<oneshot::Sender<()>>>>,
}

impl AwaitedRepoRegistry {
    pub fn new() -> Self {
        Self {
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Register interest in `tag`'s next repo regeneration and block until
    /// it's fulfilled or [`WAIT_REPO_TIMEOUT`] elapses (spec §4.6).
    pub async fn wait_for(&self, tag: &str) -> Result<(), DaemonError> {
        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .await
            .entry(tag.to_string())
            .or_default()
            .push(tx);

        match timeout(WAIT_REPO_TIMEOUT, rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(DaemonError::WaitTimeout(tag.to_string())),
            Err(_) => Err(DaemonError::WaitTimeout(tag.to_string())),
        }
    }

    /// Fulfill every waiter currently registered on `tag` (called when a
    /// `repo_done` bus event for `tag` arrives, spec §4.6).
    pub async fn fulfill(&self, tag: &str) {
        if let Some(senders) = self.waiters.lock().await.remove(tag) {
            for tx in senders {
                let _ = tx.send(());
            }
        }
    }
}

impl Default for AwaitedRepoRegistry {
    fn default() -> Self {
        Self::new()
    }
}
