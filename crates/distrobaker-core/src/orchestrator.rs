//! Rebuild Orchestrator (spec §3, §4.5) — turns a flushed batch of
//! [`RebuildData`] into downstream builds: resolve each component's
//! destination SCMURL, group by destination target, wait for the
//! destination build tag's repo to be current, then submit one multicall
//! per [`KOJI_BATCH`](crate::types::KOJI_BATCH)-sized chunk.
//!
//! Grounded on `listener.py`'s `orchestrate`/`rebuild` pair: tag, wait for
//! repo, then build — in that order, because a build started against a
//! stale repo can pick up an out-of-date dependency. Side-tag routing
//! (spec §4.1 rule 5) changes which tag gets built into, not the ordering.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::awaited::AwaitedRepoRegistry;
use crate::config::{ComponentRoute, ConfigSnapshot};
use crate::error::DaemonError;
use crate::http::GitSyncClient;
use crate::koji::{BuildSystemClient, BuildSystemSession, QueuedRebuild, RebuildOutcome};
use crate::module::split_module;
use crate::scmurl::split_scmurl;
use crate::types::{Namespace, RebuildData, KOJI_BATCH};

/// One component's outcome after orchestration, paired back with its
/// originating [`RebuildData`] for reporting.
pub struct OrchestratedRebuild {
    pub data: RebuildData,
    pub outcome: Result<RebuildOutcome, DaemonError>,
}

fn route_for<'a>(cfg: &'a ConfigSnapshot, data: &RebuildData) -> Option<&'a ComponentRoute> {
    let key = match data.ns {
        Namespace::Rpms => data.comp.clone(),
        Namespace::Modules => {
            let m = split_module(&data.comp);
            format!("{}:{}", m.name, m.stream)
        }
    };
    cfg.comps.get(data.ns, &key)
}

/// Resolve the git ref the downstream push should land on: a pinned
/// module rpm override takes precedence over the upstream SCMURL's own
/// ref (spec §4.3, §6).
fn resolve_ref(data: &RebuildData) -> String {
    let upstream = split_scmurl(&data.scmurl);
    data.ref_overrides
        .as_ref()
        .and_then(|overrides| overrides.get(&data.comp))
        .cloned()
        .or(upstream.ref_)
        .unwrap_or_else(|| "master".to_string())
}

/// Build the downstream-pushed SCMURL: `"{prefix}/{ns}/{comp}#{ref}"`.
fn downstream_scmurl(cfg: &ConfigSnapshot, data: &RebuildData, git_ref: &str) -> String {
    format!(
        "{}/{}/{}#{}",
        cfg.main.build.prefix,
        data.ns.as_str(),
        data.comp,
        git_ref
    )
}

/// Notify the git-sync collaborator for this component, and, when the
/// component carries module ref overrides, for each rpm they name too
/// (spec §4.3 step 3).
async fn notify_git_sync(git_sync: &GitSyncClient, data: &RebuildData, git_ref: &str) {
    git_sync.notify(data.ns, &data.comp, git_ref).await;
    if let Some(overrides) = &data.ref_overrides {
        for (comp, rpm_ref) in overrides {
            git_sync.notify(Namespace::Rpms, comp, rpm_ref).await;
        }
    }
}

/// Orchestrate one flushed batch: resolve routes, group by destination
/// target, wait for each target's repo, then submit.
pub async fn orchestrate(
    cfg: &Arc<ConfigSnapshot>,
    build_system: &dyn BuildSystemClient,
    session: &BuildSystemSession,
    awaited: &AwaitedRepoRegistry,
    git_sync: Option<&GitSyncClient>,
    batch: Vec<RebuildData>,
) -> Vec<OrchestratedRebuild> {
    let mut by_target: BTreeMap<String, Vec<(RebuildData, String, String)>> = BTreeMap::new();
    let mut skipped = Vec::new();

    for data in batch {
        if route_for(cfg, &data).is_none() {
            skipped.push(OrchestratedRebuild {
                data,
                outcome: Err(DaemonError::ComponentIneligible(
                    "no route configured".into(),
                )),
            });
            continue;
        }
        let target = data
            .downstream_target
            .clone()
            .unwrap_or_else(|| cfg.main.build.target.clone());
        let git_ref = resolve_ref(&data);
        let scmurl = downstream_scmurl(cfg, &data, &git_ref);
        by_target
            .entry(target)
            .or_default()
            .push((data, scmurl, git_ref));
    }

    let mut out = skipped;

    for (target, entries) in by_target {
        let build_target = match build_system.get_build_target(session, &target).await {
            Ok(Some(bt)) => bt,
            Ok(None) => {
                for (data, _, _) in entries {
                    out.push(OrchestratedRebuild {
                        data,
                        outcome: Err(DaemonError::Config(format!(
                            "build target {target} does not exist"
                        ))),
                    });
                }
                continue;
            }
            Err(e) => {
                let reason = e.to_string();
                for (data, _, _) in entries {
                    let component = data.comp.clone();
                    out.push(OrchestratedRebuild {
                        data,
                        outcome: Err(DaemonError::EnrichmentFailure {
                            component,
                            source: anyhow::anyhow!("{reason}"),
                        }),
                    });
                }
                continue;
            }
        };

        // Pre-tag/wait only makes sense when both build systems are the
        // same instance (spec §4.3 step 2); cross-system syncs skip
        // straight to the build step.
        if cfg.main.control.build && cfg.main.source.profile == cfg.main.destination.profile {
            for chunk in entries.chunks(KOJI_BATCH) {
                let nvrs: Vec<String> = chunk.iter().map(|(data, _, _)| data.nvr()).collect();
                match build_system.tag_builds(session, &target, &nvrs).await {
                    Ok(outcomes) => {
                        for ((data, _, _), outcome) in chunk.iter().zip(outcomes) {
                            if let RebuildOutcome::Failed { reason } = outcome {
                                warn!(component = %data.comp, "tagBuild failed: {reason}");
                            }
                        }
                    }
                    Err(e) => warn!(%target, "tagBuild multicall failed: {e}"),
                }
            }

            info!(tag = %build_target.build_tag, count = entries.len(), "awaiting repo before submitting batch");
            if let Err(e) = awaited.wait_for(&build_target.build_tag).await {
                warn!(tag = %build_target.build_tag, "repo wait timed out, proceeding anyway: {e}");
            }
        }

        if cfg.main.control.build {
            if let Some(git_sync) = git_sync {
                for (data, _, git_ref) in &entries {
                    notify_git_sync(git_sync, data, git_ref).await;
                }
            }
        }

        let rebuilds: Vec<QueuedRebuild> = entries
            .iter()
            .map(|(_, scmurl, _)| QueuedRebuild {
                tag: build_target.build_tag.clone(),
                scmurl: scmurl.clone(),
                target: target.clone(),
                scratch: cfg.main.build.scratch,
            })
            .collect();

        for (chunk_rebuilds, chunk_entries) in
            rebuilds.chunks(KOJI_BATCH).zip(entries.chunks(KOJI_BATCH))
        {
            let outcomes = if cfg.main.control.build {
                build_system
                    .submit_batch(session, chunk_rebuilds)
                    .await
                    .unwrap_or_else(|e| {
                        chunk_rebuilds
                            .iter()
                            .map(|_| RebuildOutcome::Failed {
                                reason: e.to_string(),
                            })
                            .collect()
                    })
            } else {
                chunk_rebuilds.iter().map(|_| RebuildOutcome::DryRun).collect()
            };

            for ((data, _, _), outcome) in chunk_entries.iter().zip(outcomes) {
                out.push(OrchestratedRebuild {
                    data: data.clone(),
                    outcome: Ok(outcome),
                });
            }
        }
    }

    out
}
