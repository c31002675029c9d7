//! Oneshot Mode (spec §4.8, §6) — process a fixed set of components once
//! and exit, instead of running the bus-driven event loop. Either an
//! explicit `ns/comp` selector set is given, or — when empty — every
//! latest-tagged build under `main.trigger.rpms` is enumerated. Each
//! candidate still passes the same exclude/strict eligibility gate the
//! classifier applies, then is enriched and handed straight to the
//! orchestrator with no batching, no tagging, no repo wait.
//!
//! Grounded on `daemon.py`'s oneshot branch.

use std::sync::Arc;

use tracing::warn;

use crate::awaited::AwaitedRepoRegistry;
use crate::config::ConfigSnapshot;
use crate::http::GitSyncClient;
use crate::koji::{BuildInfo, BuildSystemClient, BuildSystemSession};
use crate::orchestrator::{orchestrate, OrchestratedRebuild};
use crate::types::{Namespace, RebuildData};

/// Which components oneshot mode should process (spec §6 `-s/--select`,
/// format `ns/comp` validated against `^(rpms|modules)/[A-Za-z0-9:._+-]+$`
/// by the CLI before this point).
pub enum Selector {
    /// Every build currently tagged into `main.trigger.rpms`.
    All,
    Named(Vec<(Namespace, String)>),
}

fn eligible(cfg: &ConfigSnapshot, ns: Namespace, comp: &str) -> bool {
    if cfg.main.control.exclude.get(ns).contains(comp) {
        return false;
    }
    if cfg.main.control.strict && !cfg.comps.contains(ns, comp) {
        return false;
    }
    true
}

fn rebuild_data_from_build(ns: Namespace, build: BuildInfo) -> Option<RebuildData> {
    Some(RebuildData {
        ns,
        comp: build.name,
        version: build.version,
        release: build.release,
        scmurl: build.source?,
        downstream_target: None,
        ref_overrides: None,
    })
}

async fn all_tagged(
    cfg: &ConfigSnapshot,
    build_system: &dyn BuildSystemClient,
    session: &BuildSystemSession,
) -> Vec<RebuildData> {
    let tagged = match build_system
        .list_tagged(session, &cfg.main.trigger.rpms, None)
        .await
    {
        Ok(builds) => builds,
        Err(e) => {
            warn!("listing tagged builds for oneshot failed: {e}");
            return Vec::new();
        }
    };

    tagged
        .into_iter()
        .filter(|b| eligible(cfg, Namespace::Rpms, &b.name))
        .filter_map(|b| rebuild_data_from_build(Namespace::Rpms, b))
        .collect()
}

async fn named(
    cfg: &ConfigSnapshot,
    build_system: &dyn BuildSystemClient,
    session: &BuildSystemSession,
    selection: Vec<(Namespace, String)>,
) -> Vec<RebuildData> {
    let mut out = Vec::new();
    for (ns, comp) in selection {
        if !eligible(cfg, ns, &comp) {
            continue;
        }
        let tag = match ns {
            Namespace::Rpms => &cfg.main.trigger.rpms,
            Namespace::Modules => &cfg.main.trigger.modules,
        };
        let tagged = match build_system.list_tagged(session, tag, Some(&comp)).await {
            Ok(builds) => builds,
            Err(e) => {
                warn!(component = %comp, "listing tagged builds failed: {e}");
                continue;
            }
        };
        if let Some(latest) = tagged.into_iter().next() {
            if let Some(data) = rebuild_data_from_build(ns, latest) {
                out.push(data);
            }
        }
    }
    out
}

/// Run one pass over the selected components and return each one's
/// orchestration outcome.
pub async fn run(
    cfg: &Arc<ConfigSnapshot>,
    build_system: &dyn BuildSystemClient,
    session: &BuildSystemSession,
    awaited: &AwaitedRepoRegistry,
    git_sync: Option<&GitSyncClient>,
    selector: Selector,
) -> Vec<OrchestratedRebuild> {
    let batch = match selector {
        Selector::All => all_tagged(cfg, build_system, session).await,
        Selector::Named(selection) => named(cfg, build_system, session, selection).await,
    };

    orchestrate(cfg, build_system, session, awaited, git_sync, batch).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        BuildConfig, CacheTemplate, ComponentRoute, Comps, Control, Defaults, ExcludeSet,
        GitMeta, MainConfig, RouteCache, SourceDestPair, Trigger,
    };
    use crate::koji::FakeBuildSystem;
    use crate::types::Role;

    fn snapshot() -> ConfigSnapshot {
        let pair = SourceDestPair {
            scm: "https://src.example.com".into(),
            cache_url: "https://cache".into(),
            cache_cgi: "https://cache/cgi".into(),
            cache_path: "/x".into(),
            profile: "p".into(),
            mbs: serde_yaml::Value::Null,
        };
        let mut comps = Comps::default();
        comps.rpms.insert(
            "bash".into(),
            ComponentRoute {
                source: "rpms/bash".into(),
                destination: "rpms/bash".into(),
                cache: RouteCache {
                    source: "cache/bash".into(),
                    destination: "cache/bash".into(),
                },
            },
        );
        ConfigSnapshot {
            main: MainConfig {
                source: pair.clone(),
                destination: pair,
                trigger: Trigger {
                    rpms: "f42-gate".into(),
                    modules: "f42-modular-gate".into(),
                },
                build: BuildConfig {
                    prefix: "git+https://pkgs.example.com".into(),
                    target: "f42".into(),
                    platform: "f42".into(),
                    scratch: false,
                },
                git: GitMeta {
                    author: "bot".into(),
                    email: "bot@example.com".into(),
                    message: "sync".into(),
                },
                control: Control {
                    build: true,
                    merge: true,
                    strict: true,
                    autopackagelist: None,
                    exclude: ExcludeSet::default(),
                },
                defaults: Defaults {
                    cache: CacheTemplate {
                        source: "cache/%(component)s".into(),
                        destination: "cache/%(component)s".into(),
                    },
                    rpms: CacheTemplate {
                        source: "rpms/%(component)s".into(),
                        destination: "rpms/%(component)s".into(),
                    },
                    modules: CacheTemplate {
                        source: "modules/%(component)s/%(stream)s".into(),
                        destination: "modules/%(component)s/%(stream)s".into(),
                    },
                },
            },
            comps,
            config_ref: "abc".into(),
        }
    }

    fn build(name: &str, scmurl: Option<&str>) -> BuildInfo {
        BuildInfo {
            name: name.into(),
            version: "5.2".into(),
            release: "1.fc42".into(),
            nvr: format!("{name}-5.2-1.fc42"),
            source: scmurl.map(String::from),
            modulemd: None,
        }
    }

    #[tokio::test]
    async fn all_selector_applies_strict_gate_and_skips_unconfigured() {
        let cfg = Arc::new(snapshot());
        let fake = FakeBuildSystem::default();
        fake.tagged.lock().unwrap().insert(
            "f42-gate".into(),
            vec![
                build("bash", Some("git+https://src.example.com/rpms/bash#abc")),
                build("not-configured", Some("git+https://src.example.com/rpms/x#abc")),
            ],
        );
        fake.targets.lock().unwrap().insert(
            "f42".into(),
            crate::koji::BuildTarget {
                name: "f42".into(),
                build_tag: "f42-build".into(),
                dest_tag: "f42".into(),
            },
        );
        let session = fake.login(Role::Destination).await.unwrap();
        let awaited = Arc::new(AwaitedRepoRegistry::new());

        let fulfiller_awaited = awaited.clone();
        let fulfiller = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            fulfiller_awaited.fulfill("f42-build").await;
        });

        let results = run(&cfg, &fake, &session, &awaited, None, Selector::All).await;
        fulfiller.await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].data.comp, "bash");
    }

    #[tokio::test]
    async fn named_selector_with_no_tagged_build_is_skipped_silently() {
        let cfg = Arc::new(snapshot());
        let fake = FakeBuildSystem::default();
        let session = fake.login(Role::Destination).await.unwrap();
        let awaited = AwaitedRepoRegistry::new();

        let results = run(
            &cfg,
            &fake,
            &session,
            &awaited,
            None,
            Selector::Named(vec![(Namespace::Rpms, "bash".into())]),
        )
        .await;
        assert!(results.is_empty());
    }
}
