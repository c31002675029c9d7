//! Message Classifier (spec §3, §4.1) — turns one bus event into either a
//! [`RebuildData`] ready for the coalescer, or a contained
//! [`DaemonError`] explaining why it was dropped.
//!
//! Grounded on `listener.py`'s `classify`: tag family lookup first (is this
//! our rpm gate, our module gate, or a side-tag of either?), then the
//! component-eligibility gate (exclude list, then strict-mode membership
//! in `comps`), then enrichment (build lookup, and for modules, a
//! modulemd fetch for per-rpm ref overrides). Nothing past this module
//! ever sees a tag name again; it only ever passes on a full `RebuildData`.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{self, ConfigSnapshot};
use crate::error::DaemonError;
use crate::koji::{BuildSystemClient, BuildSystemSession};
use crate::module::split_module;
use crate::sidetag::{ensure_side_tag, SideTagMap};
use crate::types::{Namespace, RebuildData, TagEvent};

/// Which trigger family a tag event matched, resolved before eligibility
/// or enrichment run (spec §4.1 evaluation order).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagFamily {
    Rpms,
    Modules,
    /// Stack-gate or `-side` tag (spec §4.1 rule 5) — always routes rpms.
    SideTag,
}

fn resolve_family(cfg: &ConfigSnapshot, tag: &str) -> Option<TagFamily> {
    if tag == cfg.main.trigger.rpms {
        return Some(TagFamily::Rpms);
    }
    if tag == cfg.main.trigger.modules {
        return Some(TagFamily::Modules);
    }
    let upstream_build_tag = cfg.main.upstream_build_tag();
    if tag.starts_with(&upstream_build_tag)
        && (tag.ends_with("-stack-gate") || tag.starts_with(&format!("{upstream_build_tag}-side")))
    {
        return Some(TagFamily::SideTag);
    }
    None
}

/// Classify one tagging event against a configuration snapshot, enriching
/// it via the build system as needed. `source_session` reads the event's
/// own build system; `dest_session` is only consulted for side-tag
/// provisioning (spec §4.5 step 2, which creates the side tag on the
/// destination).
pub async fn classify(
    cfg: &Arc<ConfigSnapshot>,
    sidetags: &SideTagMap,
    build_system: &dyn BuildSystemClient,
    source_session: &BuildSystemSession,
    dest_session: &BuildSystemSession,
    event: &TagEvent,
) -> Result<RebuildData, DaemonError> {
    let family = resolve_family(cfg, &event.tag).ok_or_else(|| {
        DaemonError::BusEventUnrecognized(format!("tag {} matches no trigger", event.tag))
    })?;

    let ns = match family {
        TagFamily::Rpms | TagFamily::SideTag => Namespace::Rpms,
        TagFamily::Modules => Namespace::Modules,
    };

    let comp_key = match ns {
        Namespace::Rpms => event.name.clone(),
        Namespace::Modules => {
            let m = split_module(&event.name);
            format!("{}:{}", m.name, m.stream)
        }
    };

    if cfg.main.control.exclude.get(ns).contains(&comp_key) {
        return Err(DaemonError::ComponentIneligible(format!(
            "{comp_key} is on the exclude list"
        )));
    }

    if cfg.main.control.strict && !cfg.comps.contains(ns, &comp_key) {
        return Err(DaemonError::ComponentIneligible(format!(
            "{comp_key} is not configured and strict mode is on"
        )));
    }

    let nvr = format!("{}-{}-{}", event.name, event.version, event.release);
    let build = build_system
        .get_build(source_session, &nvr)
        .await
        .map_err(|e| DaemonError::EnrichmentFailure {
            component: comp_key.clone(),
            source: e.into(),
        })?
        .ok_or_else(|| DaemonError::EnrichmentFailure {
            component: comp_key.clone(),
            source: anyhow::anyhow!("build {nvr} not found on the build system"),
        })?;

    let scmurl = build
        .source
        .clone()
        .ok_or_else(|| DaemonError::EnrichmentFailure {
            component: comp_key.clone(),
            source: anyhow::anyhow!("build {nvr} has no source SCMURL"),
        })?;

    let downstream_target = match family {
        TagFamily::SideTag => {
            let downstream_build_target = build_system
                .get_build_target(dest_session, &cfg.main.build.target)
                .await
                .map_err(|e| DaemonError::EnrichmentFailure {
                    component: comp_key.clone(),
                    source: e.into(),
                })?
                .ok_or_else(|| DaemonError::EnrichmentFailure {
                    component: comp_key.clone(),
                    source: anyhow::anyhow!(
                        "destination target {} does not exist",
                        cfg.main.build.target
                    ),
                })?
                .build_tag;

            let resolved = ensure_side_tag(
                sidetags,
                build_system,
                source_session,
                dest_session,
                &event.tag,
                &downstream_build_target,
                &cfg.main.build.target,
                !cfg.main.control.build,
            )
            .await?;
            debug!(tag = %event.tag, side_tag = %resolved, "event arrived via a stack-gate/side tag");
            Some(cfg.main.build.target.clone())
        }
        _ => None,
    };

    let ref_overrides = match (ns, &build.modulemd) {
        (Namespace::Modules, Some(modulemd)) => match config::ref_overrides_from_modulemd(modulemd) {
            Ok(overrides) => Some(overrides),
            Err(e) => {
                warn!(component = %comp_key, "failed to parse modulemd ref overrides: {e}");
                None
            }
        },
        (Namespace::Modules, None) => {
            warn!(component = %comp_key, "module build carries no modulemd, skipping ref overrides");
            None
        }
        (Namespace::Rpms, _) => None,
    };

    Ok(RebuildData {
        ns,
        comp: event.name.clone(),
        version: event.version.clone(),
        release: event.release.clone(),
        scmurl,
        downstream_target,
        ref_overrides,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        BuildConfig, CacheTemplate, Comps, Control, Defaults, ExcludeSet, GitMeta, MainConfig,
        SourceDestPair, Trigger,
    };
    use crate::koji::{BuildInfo, FakeBuildSystem};

    fn base_config() -> ConfigSnapshot {
        let pair = SourceDestPair {
            scm: "https://src.example.com".into(),
            cache_url: "https://cache".into(),
            cache_cgi: "https://cache/cgi".into(),
            cache_path: "/x".into(),
            profile: "p".into(),
            mbs: serde_yaml::Value::Null,
        };
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
                    exclude: ExcludeSet {
                        rpms: ["blocked".to_string()].into_iter().collect(),
                        modules: Default::default(),
                    },
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
            comps: {
                let mut comps = Comps::default();
                comps.rpms.insert(
                    "bash".into(),
                    crate::config::ComponentRoute {
                        source: "rpms/bash".into(),
                        destination: "rpms/bash".into(),
                        cache: crate::config::RouteCache {
                            source: "cache/bash".into(),
                            destination: "cache/bash".into(),
                        },
                    },
                );
                comps
            },
            config_ref: "abc".into(),
        }
    }

    fn event(name: &str, tag: &str) -> TagEvent {
        TagEvent {
            topic: "buildsys.tag".into(),
            tag: tag.into(),
            name: name.into(),
            version: "5.2".into(),
            release: "1.fc42".into(),
            build_id: 1,
        }
    }

    async fn sessions(fake: &FakeBuildSystem) -> (BuildSystemSession, BuildSystemSession) {
        (
            fake.login(crate::types::Role::Source).await.unwrap(),
            fake.login(crate::types::Role::Destination).await.unwrap(),
        )
    }

    #[tokio::test]
    async fn rejects_unrecognized_tag() {
        let cfg = Arc::new(base_config());
        let sidetags = SideTagMap::new();
        let fake = FakeBuildSystem::default();
        let (source, dest) = sessions(&fake).await;
        let err = classify(&cfg, &sidetags, &fake, &source, &dest, &event("bash", "unrelated"))
            .await
            .unwrap_err();
        assert!(matches!(err, DaemonError::BusEventUnrecognized(_)));
    }

    #[tokio::test]
    async fn rejects_excluded_component() {
        let cfg = Arc::new(base_config());
        let sidetags = SideTagMap::new();
        let fake = FakeBuildSystem::default();
        let (source, dest) = sessions(&fake).await;
        let err = classify(&cfg, &sidetags, &fake, &source, &dest, &event("blocked", "f42-gate"))
            .await
            .unwrap_err();
        assert!(matches!(err, DaemonError::ComponentIneligible(_)));
    }

    #[tokio::test]
    async fn strict_mode_rejects_unconfigured_component() {
        let cfg = Arc::new(base_config());
        let sidetags = SideTagMap::new();
        let fake = FakeBuildSystem::default();
        let (source, dest) = sessions(&fake).await;
        let err = classify(
            &cfg,
            &sidetags,
            &fake,
            &source,
            &dest,
            &event("not-configured", "f42-gate"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DaemonError::ComponentIneligible(_)));
    }

    #[tokio::test]
    async fn classifies_and_enriches_a_configured_component() {
        let cfg = Arc::new(base_config());
        let sidetags = SideTagMap::new();
        let fake = FakeBuildSystem::default();
        fake.builds.lock().unwrap().insert(
            "bash-5.2-1.fc42".into(),
            BuildInfo {
                name: "bash".into(),
                version: "5.2".into(),
                release: "1.fc42".into(),
                nvr: "bash-5.2-1.fc42".into(),
                source: Some("git+https://src.example.com/rpms/bash#abc".into()),
                modulemd: None,
            },
        );
        let (source, dest) = sessions(&fake).await;
        let data = classify(&cfg, &sidetags, &fake, &source, &dest, &event("bash", "f42-gate"))
            .await
            .unwrap();
        assert_eq!(data.comp, "bash");
        assert_eq!(data.scmurl, "git+https://src.example.com/rpms/bash#abc");
        assert_eq!(data.ns, Namespace::Rpms);
        assert!(data.downstream_target.is_none());
    }

    #[tokio::test]
    async fn enrichment_failure_when_build_missing() {
        let cfg = Arc::new(base_config());
        let sidetags = SideTagMap::new();
        let fake = FakeBuildSystem::default();
        let (source, dest) = sessions(&fake).await;
        let err = classify(&cfg, &sidetags, &fake, &source, &dest, &event("bash", "f42-gate"))
            .await
            .unwrap_err();
        assert!(matches!(err, DaemonError::EnrichmentFailure { .. }));
    }

    #[tokio::test]
    async fn stack_gate_tag_provisions_side_tag_and_routes_to_build_target() {
        let cfg = Arc::new(base_config());
        let sidetags = SideTagMap::new();
        let fake = FakeBuildSystem::default();
        fake.targets.lock().unwrap().insert(
            "f42".into(),
            crate::koji::BuildTarget {
                name: "f42".into(),
                build_tag: "f42-build".into(),
                dest_tag: "f42".into(),
            },
        );
        fake.builds.lock().unwrap().insert(
            "bash-5.2-1.fc42".into(),
            BuildInfo {
                name: "bash".into(),
                version: "5.2".into(),
                release: "1.fc42".into(),
                nvr: "bash-5.2-1.fc42".into(),
                source: Some("git+https://src.example.com/rpms/bash#abc".into()),
                modulemd: None,
            },
        );
        let (source, dest) = sessions(&fake).await;

        let data = classify(
            &cfg,
            &sidetags,
            &fake,
            &source,
            &dest,
            &event("bash", "f42-build-stack-gate"),
        )
        .await
        .unwrap();
        assert_eq!(data.downstream_target.as_deref(), Some("f42"));

        classify(
            &cfg,
            &sidetags,
            &fake,
            &source,
            &dest,
            &event("bash", "f42-build-stack-gate"),
        )
        .await
        .unwrap();

        assert_eq!(fake.submitted.lock().unwrap().len(), 0);
        assert_eq!(
            fake.tags
                .lock()
                .unwrap()
                .keys()
                .filter(|k| k.contains("side"))
                .count(),
            1
        );
    }
}
