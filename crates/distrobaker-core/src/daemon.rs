//! Daemon wiring (spec §2, §4) — bundles the config store, session cache,
//! awaited-repo registry, and side-tag map, and runs the bus-driven event
//! loop: subscribe, classify, coalesce, orchestrate, repeat, alongside the
//! config reloader ticking in the background.
//!
//! Grounded on `listener.py`'s top-level `main` loop, reshaped around
//! `tokio::select!` over a handful of long-lived tasks the way the
//! teacher's CLI (`shipper-cli/src/main.rs`) composes its engine and
//! reporter rather than hand-rolling a scheduler.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use distrobaker_retry::RetryStrategyConfig;

use crate::awaited::AwaitedRepoRegistry;
use crate::bus::{BusMessage, MessageBus};
use crate::classifier::classify;
use crate::coalescer;
use crate::config::ConfigStore;
use crate::error::DaemonError;
use crate::http::GitSyncClient;
use crate::koji::BuildSystemClient;
use crate::orchestrator::orchestrate;
use crate::reload::{self, ReloadSource};
use crate::session::SessionCache;
use crate::sidetag::SideTagMap;
use crate::types::{Role, DEFAULT_BATCH_TIMER, DEFAULT_CONFIG_TIMER};

pub struct Daemon {
    pub store: Arc<ConfigStore>,
    pub sessions: Arc<SessionCache>,
    pub awaited: Arc<AwaitedRepoRegistry>,
    pub sidetags: Arc<SideTagMap>,
    pub build_system: Arc<dyn BuildSystemClient>,
    pub bus: Arc<dyn MessageBus>,
    pub http_client: reqwest::Client,
    pub retry: RetryStrategyConfig,
    pub reload_source: ReloadSource,
    pub git_sync: Option<GitSyncClient>,
    pub batch_timer: std::time::Duration,
    pub config_timer: std::time::Duration,
}

impl Daemon {
    /// Run forever: the config reloader, the bus subscription, and the
    /// classify -> coalesce -> orchestrate pipeline, all concurrently.
    /// Returns only on an unrecoverable error (spec §6, §7).
    pub async fn run(self) -> Result<(), DaemonError> {
        let (bus_tx, mut bus_rx) = mpsc::channel::<BusMessage>(256);
        self.bus
            .subscribe(bus_tx)
            .await
            .map_err(|e| DaemonError::Config(format!("bus subscription failed: {e}")))?;

        let reload_store = self.store.clone();
        let reload_sessions = self.sessions.clone();
        let reload_client = self.http_client.clone();
        let reload_retry = self.retry.clone();
        let reload_tick = self.config_timer;
        let reload_source = self.reload_source;
        let reload_handle = tokio::spawn(async move {
            reload::run(
                reload_source,
                reload_store,
                reload_sessions,
                reload_client,
                reload_retry,
                reload_tick,
            )
            .await
        });

        let (rebuild_tx, rebuild_rx) = mpsc::channel(256);
        let store = self.store.clone();
        let sessions = self.sessions.clone();
        let sidetags = self.sidetags.clone();
        let build_system = self.build_system.clone();
        let awaited_for_classify = self.awaited.clone();
        let classify_handle = tokio::spawn(async move {
            while let Some(msg) = bus_rx.recv().await {
                let event = match msg {
                    BusMessage::Tag(event) => event,
                    BusMessage::RepoDone(done) => {
                        awaited_for_classify.fulfill(&done.tag).await;
                        continue;
                    }
                    BusMessage::Unrecognized { topic } => {
                        warn!(%topic, "ignoring message on an unrecognized topic");
                        continue;
                    }
                };

                let cfg = store.snapshot().await;
                let source = match sessions
                    .get(Role::Source, || build_system.login(Role::Source))
                    .await
                {
                    Ok(s) => s,
                    Err(e) => {
                        warn!("could not obtain source session: {e}");
                        continue;
                    }
                };
                let dest = match sessions
                    .get(Role::Destination, || build_system.login(Role::Destination))
                    .await
                {
                    Ok(s) => s,
                    Err(e) => {
                        warn!("could not obtain destination session: {e}");
                        continue;
                    }
                };

                match classify(&cfg, &sidetags, build_system.as_ref(), &source, &dest, &event).await {
                    Ok(data) => {
                        if rebuild_tx.send(data).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        info!(tag = %event.tag, "event not classified into a rebuild: {e}");
                    }
                }
            }
        });

        let store = self.store.clone();
        let sessions = self.sessions.clone();
        let build_system = self.build_system.clone();
        let awaited = self.awaited.clone();
        let git_sync = self.git_sync.clone();
        let orchestrate_handle = tokio::spawn(async move {
            coalescer::run(rebuild_rx, self.batch_timer, |batch| {
                let store = store.clone();
                let sessions = sessions.clone();
                let build_system = build_system.clone();
                let awaited = awaited.clone();
                let git_sync = git_sync.clone();
                async move {
                    let cfg = store.snapshot().await;
                    let session = match sessions
                        .get(Role::Destination, || build_system.login(Role::Destination))
                        .await
                    {
                        Ok(s) => s,
                        Err(e) => {
                            warn!("could not obtain destination session, dropping batch: {e}");
                            return;
                        }
                    };
                    let results = orchestrate(
                        &cfg,
                        build_system.as_ref(),
                        &session,
                        &awaited,
                        git_sync.as_ref(),
                        batch,
                    )
                    .await;
                    for result in results {
                        match result.outcome {
                            Ok(outcome) => {
                                info!(component = %result.data.comp, "{outcome:?}");
                            }
                            Err(e) => {
                                warn!(component = %result.data.comp, "orchestration failed: {e}");
                            }
                        }
                    }
                }
            })
            .await;
        });

        tokio::select! {
            res = reload_handle => {
                res.map_err(|e| DaemonError::Config(format!("reload task panicked: {e}")))??;
            }
            res = classify_handle => {
                res.map_err(|e| DaemonError::Config(format!("classify task panicked: {e}")))?;
            }
            res = orchestrate_handle => {
                res.map_err(|e| DaemonError::Config(format!("orchestrate task panicked: {e}")))?;
            }
        }

        Ok(())
    }
}

pub fn default_batch_timer() -> std::time::Duration {
    DEFAULT_BATCH_TIMER
}

pub fn default_config_timer() -> std::time::Duration {
    DEFAULT_CONFIG_TIMER
}
